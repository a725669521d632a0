//! # Nyx Virtual Machine
//!
//! A single-threaded, stack-based bytecode interpreter.
//!
//! ## Execution model
//! - One operand stack, one call-frame stack, a flat program counter
//! - Opcode bytes are decoded through a fixed 256-entry table; unassigned
//!   bytes fault with IllegalOpcode
//! - Collaborator opcodes (knowledge query, voice I/O) flip the VM to
//!   `SuspendedOnIo` for the duration of the injected client call; from the
//!   VM's perspective the call is blocking
//! - A fault is terminal for the run: the VM reports a structured
//!   `FaultInfo {opcode, pc, cause}` and never retries the instruction
//!
//! Only one unit executes on a VM instance at a time. Globals and the
//! personality survive across `run` calls on the same instance, which is what
//! the REPL builds on.

use crate::bytecode::{CompiledUnit, Constant, Op};
use crate::collaborator::{KnowledgeClient, VoiceClient};
use crate::error::{self, Error, ErrorKind, Result};
use crate::personality::{Personality, Trait, TRAIT_COUNT};
use crate::stack::Stack;
use crate::value::{Tensor, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Maximum call-frame depth.
pub const MAX_CALL_DEPTH: usize = 64;

/// VM lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmState {
    /// Constructed, nothing executed yet
    Ready,
    /// Executing instructions
    Running,
    /// Blocked on a collaborator call
    SuspendedOnIo,
    /// Finished normally (RETURN at depth zero or end of program)
    Halted,
    /// Terminal: an opcode precondition was violated
    Faulted,
}

/// Log levels for the host-injected log callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured description of a runtime fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultInfo {
    /// Mnemonic of the faulting instruction ("<illegal>" for unassigned bytes)
    pub opcode: &'static str,
    /// Instruction index at the time of the fault
    pub pc: usize,
    /// What went wrong
    pub cause: ErrorKind,
}

impl fmt::Display for FaultInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at pc {} ({})", self.cause, self.pc, self.opcode)
    }
}

/// One call frame: where to return to, and where this frame's locals start
/// on the operand stack.
#[derive(Debug, Clone, Copy)]
struct Frame {
    return_pc: usize,
    base: usize,
}

type LogCallback = Box<dyn Fn(LogLevel, &str)>;

/// The Nyx interpreter.
pub struct Vm {
    knowledge: Box<dyn KnowledgeClient>,
    voice: Box<dyn VoiceClient>,
    personality: Personality,
    globals: Vec<Value>,
    state: VmState,
    last_fault: Option<FaultInfo>,
    outputs: Vec<String>,
    log: Option<LogCallback>,
    echo_output: bool,
}

impl Vm {
    /// Create a VM with injected collaborator clients and a default
    /// personality.
    pub fn new(knowledge: Box<dyn KnowledgeClient>, voice: Box<dyn VoiceClient>) -> Self {
        Self {
            knowledge,
            voice,
            personality: Personality::new(),
            globals: Vec::new(),
            state: VmState::Ready,
            last_fault: None,
            outputs: Vec::new(),
            log: None,
            echo_output: false,
        }
    }

    /// Start with a pre-loaded personality (e.g. restored from storage).
    pub fn with_personality(mut self, personality: Personality) -> Self {
        self.personality = personality;
        self
    }

    /// Install a log callback.
    pub fn with_log_callback(mut self, callback: impl Fn(LogLevel, &str) + 'static) -> Self {
        self.log = Some(Box::new(callback));
        self
    }

    /// Echo PRINT output to stdout as it happens (the CLI turns this on;
    /// tests read `outputs()` instead).
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo_output = echo;
        self
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn state(&self) -> VmState {
        self.state
    }

    /// The structured fault from the last run, if it faulted.
    pub fn last_fault(&self) -> Option<&FaultInfo> {
        self.last_fault.as_ref()
    }

    pub fn personality(&self) -> &Personality {
        &self.personality
    }

    pub fn personality_mut(&mut self) -> &mut Personality {
        &mut self.personality
    }

    /// Everything PRINT produced, in order, across runs.
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Drain the collected PRINT output.
    pub fn take_outputs(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outputs)
    }

    /// Clear a fault so the instance can run again. Globals and personality
    /// are kept; this is the host's explicit teardown-and-reuse path, the VM
    /// never does it on its own.
    pub fn reset(&mut self) {
        self.state = VmState::Ready;
        self.last_fault = None;
    }

    fn log(&self, level: LogLevel, message: &str) {
        if let Some(callback) = &self.log {
            callback(level, message);
        }
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Execute a compiled unit to completion.
    ///
    /// `Ready/Halted -> Running -> Halted`, or `-> Faulted` with the error
    /// describing the fault (opcode and pc attached as context).
    pub fn run(&mut self, unit: &CompiledUnit) -> Result<()> {
        if self.state == VmState::Faulted {
            return Err(Error::new(
                ErrorKind::ConfigInvalid,
                "faulted VM instance cannot run again without reset",
            )
            .with_operation("vm::run"));
        }

        self.state = VmState::Running;
        let mut stack = Stack::new();
        let mut frames: Vec<Frame> = Vec::new();
        let mut pc = 0usize;

        while pc < unit.code.len() {
            let insn = unit.code[pc];
            let op = match insn.decode() {
                Some(op) => op,
                None => {
                    return Err(self.fault("<illegal>", pc, error::illegal_opcode(insn.op)));
                }
            };

            match self.step(unit, &mut stack, &mut frames, &mut pc, op, insn.a, insn.b) {
                Ok(StepResult::Continue) => {}
                Ok(StepResult::Halt) => {
                    self.state = VmState::Halted;
                    return Ok(());
                }
                Err(err) => return Err(self.fault(op.name(), pc, err)),
            }
        }

        // Running off the end of the code section is a normal halt.
        self.state = VmState::Halted;
        Ok(())
    }

    fn fault(&mut self, opcode: &'static str, pc: usize, cause: Error) -> Error {
        self.state = VmState::Faulted;
        self.last_fault = Some(FaultInfo {
            opcode,
            pc,
            cause: cause.kind(),
        });
        self.log(LogLevel::Error, &format!("fault: {} at pc {}", cause.kind(), pc));
        cause
            .with_operation("vm::run")
            .with_context("opcode", opcode)
            .with_context("pc", pc.to_string())
    }

    #[allow(clippy::too_many_arguments)]
    fn step(
        &mut self,
        unit: &CompiledUnit,
        stack: &mut Stack,
        frames: &mut Vec<Frame>,
        pc: &mut usize,
        op: Op,
        a: u32,
        b: u32,
    ) -> Result<StepResult> {
        let frame_base = frames.last().map(|f| f.base).unwrap_or(0);

        match op {
            Op::Nop => {}

            Op::Return => {
                match frames.pop() {
                    Some(frame) => {
                        let ret = stack.pop()?;
                        stack.truncate(frame.base);
                        stack.push(ret)?;
                        *pc = frame.return_pc;
                        return Ok(StepResult::Continue);
                    }
                    // RETURN at depth zero halts the program.
                    None => return Ok(StepResult::Halt),
                }
            }

            Op::PushConst => {
                let value = self.constant_value(unit, a)?;
                stack.push(value)?;
            }
            Op::PushNull => stack.push(Value::Null)?,
            Op::PushBool => stack.push(Value::Bool(a != 0))?,
            Op::Pop => {
                stack.pop()?;
            }
            Op::Dup => stack.dup()?,

            Op::LoadLocal => {
                let value = stack.get(frame_base + a as usize)?.clone();
                stack.push(value)?;
            }
            Op::StoreLocal => {
                let value = stack.pop()?;
                stack.set(frame_base + a as usize, value)?;
            }
            Op::LoadGlobal => {
                let value = self
                    .globals
                    .get(a as usize)
                    .cloned()
                    .unwrap_or(Value::Null);
                stack.push(value)?;
            }
            Op::StoreGlobal => {
                let value = stack.pop()?;
                let slot = a as usize;
                if slot >= self.globals.len() {
                    self.globals.resize(slot + 1, Value::Null);
                }
                self.globals[slot] = value;
            }

            Op::Add => Self::binary(stack, Value::add)?,
            Op::Sub => Self::binary(stack, Value::sub)?,
            Op::Mul => Self::binary(stack, Value::mul)?,
            Op::Div => Self::binary(stack, Value::div)?,
            Op::Neg => {
                let v = stack.pop()?;
                stack.push(v.neg()?)?;
            }
            Op::Not => {
                let v = stack.pop()?;
                stack.push(Value::Bool(!v.is_truthy()))?;
            }

            Op::Eq | Op::Ne => {
                let rhs = stack.pop()?;
                let lhs = stack.pop()?;
                let eq = lhs.eq_value(&rhs);
                stack.push(Value::Bool(if op == Op::Eq { eq } else { !eq }))?;
            }
            Op::Lt | Op::Le | Op::Gt | Op::Ge => {
                use std::cmp::Ordering::*;
                let rhs = stack.pop()?;
                let lhs = stack.pop()?;
                let ord = lhs.compare(&rhs)?;
                let result = match op {
                    Op::Lt => ord == Less,
                    Op::Le => ord != Greater,
                    Op::Gt => ord == Greater,
                    _ => ord != Less,
                };
                stack.push(Value::Bool(result))?;
            }

            Op::Jump => {
                *pc = self.jump_target(unit, a)?;
                return Ok(StepResult::Continue);
            }
            Op::JumpIfFalse => {
                let cond = stack.pop()?;
                if !cond.is_truthy() {
                    *pc = self.jump_target(unit, a)?;
                    return Ok(StepResult::Continue);
                }
            }
            Op::Call => {
                if frames.len() >= MAX_CALL_DEPTH {
                    return Err(error::call_depth_exceeded(MAX_CALL_DEPTH));
                }
                let argc = b as usize;
                if stack.len() < argc {
                    return Err(error::stack_underflow());
                }
                let target = self.jump_target(unit, a)?;
                frames.push(Frame {
                    return_pc: *pc + 1,
                    base: stack.len() - argc,
                });
                *pc = target;
                return Ok(StepResult::Continue);
            }

            Op::Print => {
                let value = stack.pop()?;
                let line = value.to_string();
                if self.echo_output {
                    println!("{}", line);
                }
                self.outputs.push(line);
            }

            Op::MakeTensor => {
                let (rows, cols) = (a, b);
                let count = (rows as usize) * (cols as usize);
                let mut data = Vec::with_capacity(count);
                for _ in 0..count {
                    data.push(stack.pop()?.as_float()?);
                }
                data.reverse();
                stack.push(Value::Tensor(Tensor::new(rows, cols, data)))?;
            }

            Op::PersonalitySet => {
                let t = self.trait_operand(a)?;
                let value = match self.constant_value(unit, b)? {
                    Value::Float(f) => f,
                    Value::Int(n) => n as f64,
                    other => {
                        return Err(error::type_mismatch("number", other.type_name()));
                    }
                };
                let new = self.personality.set(t, value);
                self.log(
                    LogLevel::Debug,
                    &format!("personality {} = {}", t.name(), new),
                );
            }
            Op::PersonalityGet => {
                let t = self.trait_operand(a)?;
                stack.push(Value::Float(self.personality.get(t)))?;
            }
            Op::Adapt => {
                let signal = stack.pop()?.as_float()?;
                self.personality.adapt(signal);
                self.log(LogLevel::Debug, &format!("adapt({})", signal));
            }

            Op::Decide => {
                let next = self.decide(unit, stack, *pc, a, b)?;
                *pc = next;
                return Ok(StepResult::Continue);
            }

            Op::KnowledgeQuery => {
                let text = match self.constant_value(unit, a)? {
                    Value::Str(s) => s,
                    other => {
                        return Err(error::type_mismatch("str constant", other.type_name()));
                    }
                };
                self.log(LogLevel::Info, &format!("knowledge query: {}", text));
                let answer = self.suspend_on_io(|vm| vm.knowledge.query(&text))?;
                stack.push(Value::Str(answer.summary))?;
            }
            Op::VoiceSay => {
                let emotion_value = stack.pop()?;
                let emotion = emotion_value.as_str()?.to_string();
                let text = stack.pop()?.to_string();
                let handle = self.suspend_on_io(|vm| vm.voice.synthesize(&text, &emotion))?;
                self.log(
                    LogLevel::Debug,
                    &format!("say -> audio {} ({} ms)", handle.id, handle.duration_ms),
                );
            }
            Op::Listen => {
                let timeout = match stack.pop()? {
                    Value::Null => None,
                    v => Some(Duration::from_millis(v.as_float()?.max(0.0) as u64)),
                };
                let text = self.suspend_on_io(|vm| vm.voice.transcribe(timeout))?;
                stack.push(Value::Str(text))?;
            }
        }

        *pc += 1;
        Ok(StepResult::Continue)
    }

    /// Run a collaborator call under the SuspendedOnIo state. The client
    /// enforces its own timeout; an elapsed timeout comes back as a
    /// CollaboratorTimeout error and faults this instruction.
    fn suspend_on_io<T>(&mut self, call: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.state = VmState::SuspendedOnIo;
        let result = call(self);
        if result.is_ok() {
            self.state = VmState::Running;
        }
        result
    }

    fn binary(stack: &mut Stack, f: impl Fn(&Value, &Value) -> Result<Value>) -> Result<()> {
        let rhs = stack.pop()?;
        let lhs = stack.pop()?;
        stack.push(f(&lhs, &rhs)?)
    }

    fn constant_value(&self, unit: &CompiledUnit, index: u32) -> Result<Value> {
        let constant = unit.constants.get(index as usize).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidConstant,
                format!("constant index {} out of range", index),
            )
        })?;
        match constant {
            Constant::Int(n) => Ok(Value::Int(*n)),
            Constant::Float(x) => Ok(Value::Float(*x)),
            Constant::Str(s) => Ok(Value::Str(s.clone())),
            Constant::Unit(_) => Err(error::type_mismatch("pushable constant", "unit")),
        }
    }

    fn trait_operand(&self, index: u32) -> Result<Trait> {
        Trait::from_index(index as usize).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidConstant,
                format!("trait index {} out of range", index),
            )
        })
    }

    fn jump_target(&self, unit: &CompiledUnit, target: u32) -> Result<usize> {
        // Jumping to code.len() is a jump to end-of-program (halt).
        if target as usize > unit.code.len() {
            return Err(error::invalid_jump(target, unit.code.len()));
        }
        Ok(target as usize)
    }

    /// Score each branch's weight vector against the personality snapshot
    /// and pick the jump-table entry of the best one.
    fn decide(
        &mut self,
        unit: &CompiledUnit,
        stack: &mut Stack,
        pc: usize,
        branches: u32,
        weights_len: u32,
    ) -> Result<usize> {
        let branches = branches as usize;
        if branches == 0 {
            return Err(error::invalid_jump(pc as u32, unit.code.len()));
        }
        if weights_len as usize != TRAIT_COUNT {
            return Err(error::type_mismatch("12-trait weight vector", "other length"));
        }
        // The jump table is the `branches` instructions following DECIDE.
        if pc + branches >= unit.code.len() {
            return Err(error::invalid_jump((pc + branches) as u32, unit.code.len()));
        }

        // Weights were pushed branch 0 first, trait order within each branch.
        let mut weights = vec![0.0f64; branches * TRAIT_COUNT];
        for slot in (0..weights.len()).rev() {
            weights[slot] = stack.pop()?.as_float()?;
        }

        let traits = self.personality.vector();
        let mut best = 0usize;
        let mut best_score = f64::NEG_INFINITY;
        for (k, chunk) in weights.chunks_exact(TRAIT_COUNT).enumerate() {
            let score: f64 = chunk.iter().zip(traits.iter()).map(|(w, t)| w * t).sum();
            self.log(LogLevel::Debug, &format!("decide: branch {} scores {}", k, score));
            if score > best_score {
                best_score = score;
                best = k;
            }
        }

        Ok(pc + 1 + best)
    }
}

enum StepResult {
    Continue,
    Halt,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Instruction;
    use crate::collaborator::{KnowledgeAnswer, MockVoice, StaticKnowledge};

    fn offline_vm() -> Vm {
        Vm::new(
            Box::new(StaticKnowledge::new()),
            Box::new(MockVoice::new()),
        )
    }

    fn unit(code: Vec<Instruction>, constants: Vec<Constant>) -> CompiledUnit {
        CompiledUnit {
            code,
            constants,
            ..CompiledUnit::default()
        }
    }

    #[test]
    fn test_print_one_plus_two() {
        // print(1 + 2): push, push, add, print, return
        let u = unit(
            vec![
                Instruction::with_a(Op::PushConst, 0),
                Instruction::with_a(Op::PushConst, 1),
                Instruction::op_only(Op::Add),
                Instruction::op_only(Op::Print),
                Instruction::op_only(Op::Return),
            ],
            vec![Constant::Int(1), Constant::Int(2)],
        );

        let mut vm = offline_vm();
        vm.run(&u).unwrap();
        assert_eq!(vm.state(), VmState::Halted);
        assert_eq!(vm.outputs(), ["3"]);
    }

    #[test]
    fn test_empty_unit_halts_without_fault() {
        let mut vm = offline_vm();
        vm.run(&CompiledUnit::new()).unwrap();
        assert_eq!(vm.state(), VmState::Halted);
        assert!(vm.last_fault().is_none());
    }

    #[test]
    fn test_illegal_opcode_faults() {
        let u = unit(vec![Instruction { op: 0xEE, a: 0, b: 0 }], vec![]);
        let mut vm = offline_vm();
        let err = vm.run(&u).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::IllegalOpcode);
        assert_eq!(vm.state(), VmState::Faulted);
        let fault = vm.last_fault().unwrap();
        assert_eq!(fault.pc, 0);
        assert_eq!(fault.cause, ErrorKind::IllegalOpcode);
    }

    #[test]
    fn test_stack_underflow_faults() {
        let u = unit(vec![Instruction::op_only(Op::Add)], vec![]);
        let mut vm = offline_vm();
        let err = vm.run(&u).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StackUnderflow);
        assert_eq!(vm.state(), VmState::Faulted);
    }

    #[test]
    fn test_division_by_zero_faults_with_pc() {
        let u = unit(
            vec![
                Instruction::with_a(Op::PushConst, 0),
                Instruction::with_a(Op::PushConst, 1),
                Instruction::op_only(Op::Div),
            ],
            vec![Constant::Int(1), Constant::Int(0)],
        );
        let mut vm = offline_vm();
        let err = vm.run(&u).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DivisionByZero);
        assert_eq!(vm.last_fault().unwrap().pc, 2);
        assert_eq!(vm.last_fault().unwrap().opcode, "DIV");
    }

    #[test]
    fn test_invalid_jump_faults() {
        let u = unit(vec![Instruction::with_a(Op::Jump, 99)], vec![]);
        let mut vm = offline_vm();
        let err = vm.run(&u).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidJump);
    }

    #[test]
    fn test_faulted_vm_requires_reset() {
        let bad = unit(vec![Instruction::op_only(Op::Pop)], vec![]);
        let mut vm = offline_vm();
        vm.run(&bad).unwrap_err();

        let err = vm.run(&CompiledUnit::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        vm.reset();
        vm.run(&CompiledUnit::new()).unwrap();
        assert_eq!(vm.state(), VmState::Halted);
    }

    #[test]
    fn test_globals_survive_across_runs() {
        let store = unit(
            vec![
                Instruction::with_a(Op::PushConst, 0),
                Instruction::with_a(Op::StoreGlobal, 0),
            ],
            vec![Constant::Int(42)],
        );
        let load = unit(
            vec![
                Instruction::with_a(Op::LoadGlobal, 0),
                Instruction::op_only(Op::Print),
            ],
            vec![],
        );

        let mut vm = offline_vm();
        vm.run(&store).unwrap();
        vm.run(&load).unwrap();
        assert_eq!(vm.outputs(), ["42"]);
    }

    #[test]
    fn test_call_and_return() {
        // fn double(x) { return x + x; }  print(double(21))
        // layout: 0..3 main, 4.. function body
        let u = unit(
            vec![
                Instruction::with_a(Op::PushConst, 0),       // 0: push 21
                Instruction::new(Op::Call, 4, 1),            // 1: call double
                Instruction::op_only(Op::Print),             // 2
                Instruction::op_only(Op::Return),            // 3
                Instruction::with_a(Op::LoadLocal, 0),       // 4: x
                Instruction::with_a(Op::LoadLocal, 0),       // 5: x
                Instruction::op_only(Op::Add),               // 6
                Instruction::op_only(Op::Return),            // 7
            ],
            vec![Constant::Int(21)],
        );

        let mut vm = offline_vm();
        vm.run(&u).unwrap();
        assert_eq!(vm.outputs(), ["42"]);
    }

    #[test]
    fn test_decide_selects_aligned_branch() {
        // personality { curiosity: 0.8 }, then decide between a
        // curiosity-weighted branch and an analytical-weighted branch.
        let curiosity = Trait::Curiosity.index() as u32;
        let mut code = vec![
            Instruction::new(Op::PersonalitySet, curiosity, 0), // curiosity = 0.8
        ];
        // analytical stays at the 0.5 default; weight vectors make branch 0
        // score 0.8 and branch 1 score 0.5.
        let mut constants = vec![Constant::Float(0.8), Constant::Float(1.0), Constant::Float(0.0)];
        for branch in 0..2u32 {
            for t in Trait::ALL {
                let one = match branch {
                    0 => t == Trait::Curiosity,
                    _ => t == Trait::Analytical,
                };
                code.push(Instruction::with_a(Op::PushConst, if one { 1 } else { 2 }));
            }
        }
        let decide_pc = code.len();
        code.push(Instruction::new(Op::Decide, 2, TRAIT_COUNT as u32));
        // jump table
        code.push(Instruction::with_a(Op::Jump, (decide_pc + 3) as u32)); // branch 0
        code.push(Instruction::with_a(Op::Jump, (decide_pc + 6) as u32)); // branch 1
        // branch 0 body: print "curious"
        constants.push(Constant::Str("curious".into()));
        code.push(Instruction::with_a(Op::PushConst, 3));
        code.push(Instruction::op_only(Op::Print));
        code.push(Instruction::op_only(Op::Return));
        // branch 1 body: print "analytical"
        constants.push(Constant::Str("analytical".into()));
        code.push(Instruction::with_a(Op::PushConst, 4));
        code.push(Instruction::op_only(Op::Print));
        code.push(Instruction::op_only(Op::Return));

        let mut vm = offline_vm();
        vm.run(&unit(code, constants)).unwrap();
        assert_eq!(vm.outputs(), ["curious"]);
        assert!((vm.personality().get(Trait::Curiosity) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_knowledge_query_pushes_summary() {
        let u = unit(
            vec![
                Instruction::with_a(Op::KnowledgeQuery, 0),
                Instruction::op_only(Op::Print),
                Instruction::op_only(Op::Return),
            ],
            vec![Constant::Str("closures".into())],
        );

        let knowledge = StaticKnowledge::new()
            .with_answer("closures", KnowledgeAnswer::new("captured environments"));
        let mut vm = Vm::new(Box::new(knowledge), Box::new(MockVoice::new()));
        vm.run(&u).unwrap();
        assert_eq!(vm.outputs(), ["captured environments"]);
        assert_eq!(vm.state(), VmState::Halted);
    }

    #[test]
    fn test_voice_say_reaches_client() {
        let u = unit(
            vec![
                Instruction::with_a(Op::PushConst, 0), // text
                Instruction::with_a(Op::PushConst, 1), // emotion
                Instruction::op_only(Op::VoiceSay),
                Instruction::op_only(Op::Return),
            ],
            vec![
                Constant::Str("hello".into()),
                Constant::Str("cheerful".into()),
            ],
        );

        let voice = std::sync::Arc::new(MockVoice::new());
        let mut vm = Vm::new(Box::new(StaticKnowledge::new()), Box::new(voice.clone()));
        vm.run(&u).unwrap();
        assert_eq!(voice.spoken(), vec![("hello".to_string(), "cheerful".to_string())]);
    }

    #[test]
    fn test_listen_timeout_faults_with_collaborator_timeout() {
        let u = unit(
            vec![
                Instruction::op_only(Op::PushNull), // no timeout
                Instruction::op_only(Op::Listen),
            ],
            vec![],
        );

        // MockVoice with no queued transcript simulates a timed-out capture.
        let mut vm = offline_vm();
        let err = vm.run(&u).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CollaboratorTimeout);
        assert_eq!(vm.state(), VmState::Faulted);
        assert_eq!(vm.last_fault().unwrap().opcode, "LISTEN");
        assert_eq!(vm.last_fault().unwrap().pc, 1);
    }

    #[test]
    fn test_listen_pushes_transcript() {
        let u = unit(
            vec![
                Instruction::op_only(Op::PushNull),
                Instruction::op_only(Op::Listen),
                Instruction::op_only(Op::Print),
            ],
            vec![],
        );

        let voice = MockVoice::new().with_transcript("hello vm");
        let mut vm = Vm::new(Box::new(StaticKnowledge::new()), Box::new(voice));
        vm.run(&u).unwrap();
        assert_eq!(vm.outputs(), ["hello vm"]);
    }

    #[test]
    fn test_make_tensor() {
        let u = unit(
            vec![
                Instruction::with_a(Op::PushConst, 0),
                Instruction::with_a(Op::PushConst, 1),
                Instruction::with_a(Op::PushConst, 2),
                Instruction::with_a(Op::PushConst, 3),
                Instruction::new(Op::MakeTensor, 2, 2),
                Instruction::op_only(Op::Print),
            ],
            vec![
                Constant::Float(1.0),
                Constant::Float(2.0),
                Constant::Float(3.0),
                Constant::Float(4.0),
            ],
        );

        let mut vm = offline_vm();
        vm.run(&u).unwrap();
        assert_eq!(vm.outputs(), ["tensor[1, 2; 3, 4]"]);
    }

    #[test]
    fn test_adapt_moves_all_traits() {
        let u = unit(
            vec![
                Instruction::with_a(Op::PushConst, 0),
                Instruction::op_only(Op::Adapt),
            ],
            vec![Constant::Float(1.0)],
        );

        let mut vm = offline_vm();
        vm.run(&u).unwrap();
        for t in Trait::ALL {
            assert!(vm.personality().get(t) > 0.5);
        }
    }

    #[test]
    fn test_idempotent_pure_execution() {
        let u = unit(
            vec![
                Instruction::with_a(Op::PushConst, 0),
                Instruction::with_a(Op::PushConst, 1),
                Instruction::op_only(Op::Mul),
                Instruction::op_only(Op::Print),
                Instruction::op_only(Op::Return),
            ],
            vec![Constant::Int(6), Constant::Int(7)],
        );

        let mut first = offline_vm();
        first.run(&u).unwrap();
        let mut second = offline_vm();
        second.run(&u).unwrap();
        second.run(&u).unwrap();

        assert_eq!(first.outputs(), ["42"]);
        assert_eq!(second.outputs(), ["42", "42"]);
    }
}
