//! # Nyx Bytecode
//!
//! The instruction set and compiled-unit model for the Nyx VM.
//!
//! ## Design
//! - Fixed-width instructions: 1 opcode byte + two u32 operands (indices or
//!   immediates), linear program counter, absolute jump targets
//! - Opcode byte values are stable across releases; unassigned byte values
//!   fault at dispatch time, they are never reused
//! - Constants live in a deduplicated pool referenced by index, never by
//!   pointer
//! - The symbol table is carried in the artifact purely for introspection;
//!   compiled code only contains resolved indices

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Nyx opcode - the operation selector of one instruction.
///
/// Byte values are part of the `.nxb` format and must stay stable.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Op {
    /// No operation
    Nop = 0,
    /// Return from the current frame; at depth zero, halt the program
    Return = 1,

    // =========================================================================
    // Stack and memory
    // =========================================================================
    /// Push constant pool entry `a`
    PushConst = 2,
    /// Push null
    PushNull = 3,
    /// Push bool (`a` = 0 or 1)
    PushBool = 4,
    /// Discard the top of stack
    Pop = 5,
    /// Duplicate the top of stack
    Dup = 6,
    /// Push local slot `a` of the current frame
    LoadLocal = 7,
    /// Pop into local slot `a` of the current frame
    StoreLocal = 8,
    /// Push global slot `a`
    LoadGlobal = 9,
    /// Pop into global slot `a`
    StoreGlobal = 10,

    // =========================================================================
    // Arithmetic and logic
    // =========================================================================
    Add = 11,
    Sub = 12,
    Mul = 13,
    Div = 14,
    Neg = 15,
    /// Logical not of the top value's truthiness
    Not = 16,
    Eq = 17,
    Ne = 18,
    Lt = 19,
    Le = 20,
    Gt = 21,
    Ge = 22,

    // =========================================================================
    // Control flow
    // =========================================================================
    /// Unconditional jump to absolute instruction index `a`
    Jump = 23,
    /// Pop; jump to `a` if the value is falsy
    JumpIfFalse = 24,
    /// Call the function whose body starts at instruction `a` with `b`
    /// arguments already on the stack
    Call = 25,
    /// Pop and print the top value
    Print = 26,
    /// Pop `a * b` floats (row-major) and push an `a` x `b` tensor
    MakeTensor = 27,

    // =========================================================================
    // Personality
    // =========================================================================
    /// Set trait `a` to the float value in constant pool entry `b`
    PersonalitySet = 28,
    /// Push the current value of trait `a`
    PersonalityGet = 29,
    /// Pop a feedback signal and nudge every trait by a bounded step
    Adapt = 30,
    /// Personality-weighted N-way branch: pop `a` weight vectors of `b`
    /// floats each, dot-product each against the trait snapshot, and jump
    /// through the `a` jump-table entries that follow to the best branch
    Decide = 31,

    // =========================================================================
    // Collaborators (suspension points)
    // =========================================================================
    /// Query the knowledge collaborator with the pool string `a`; push the
    /// answer summary
    KnowledgeQuery = 32,
    /// Pop emotion, then text; synthesize speech through the voice
    /// collaborator
    VoiceSay = 33,
    /// Pop a timeout in milliseconds (or null); push transcribed text from
    /// the voice collaborator
    Listen = 34,
}

/// Decode table: one entry per possible opcode byte. Unassigned bytes decode
/// to `None` and fault as IllegalOpcode at dispatch.
static DECODE: [Option<Op>; 256] = build_decode_table();

const fn build_decode_table() -> [Option<Op>; 256] {
    let mut table: [Option<Op>; 256] = [None; 256];
    let mut i = 0;
    while i < Op::ALL.len() {
        let op = Op::ALL[i];
        table[op as usize] = Some(op);
        i += 1;
    }
    table
}

impl Op {
    /// Every assigned opcode, in byte order.
    pub const ALL: [Op; 35] = [
        Op::Nop,
        Op::Return,
        Op::PushConst,
        Op::PushNull,
        Op::PushBool,
        Op::Pop,
        Op::Dup,
        Op::LoadLocal,
        Op::StoreLocal,
        Op::LoadGlobal,
        Op::StoreGlobal,
        Op::Add,
        Op::Sub,
        Op::Mul,
        Op::Div,
        Op::Neg,
        Op::Not,
        Op::Eq,
        Op::Ne,
        Op::Lt,
        Op::Le,
        Op::Gt,
        Op::Ge,
        Op::Jump,
        Op::JumpIfFalse,
        Op::Call,
        Op::Print,
        Op::MakeTensor,
        Op::PersonalitySet,
        Op::PersonalityGet,
        Op::Adapt,
        Op::Decide,
        Op::KnowledgeQuery,
        Op::VoiceSay,
        Op::Listen,
    ];

    /// Decode an opcode byte through the 256-entry table.
    pub fn from_byte(byte: u8) -> Option<Op> {
        DECODE[byte as usize]
    }

    /// Mnemonic used in disassembly and fault reports.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Nop => "NOP",
            Op::Return => "RETURN",
            Op::PushConst => "PUSH_CONST",
            Op::PushNull => "PUSH_NULL",
            Op::PushBool => "PUSH_BOOL",
            Op::Pop => "POP",
            Op::Dup => "DUP",
            Op::LoadLocal => "LOAD_LOCAL",
            Op::StoreLocal => "STORE_LOCAL",
            Op::LoadGlobal => "LOAD_GLOBAL",
            Op::StoreGlobal => "STORE_GLOBAL",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::Neg => "NEG",
            Op::Not => "NOT",
            Op::Eq => "EQ",
            Op::Ne => "NE",
            Op::Lt => "LT",
            Op::Le => "LE",
            Op::Gt => "GT",
            Op::Ge => "GE",
            Op::Jump => "JUMP",
            Op::JumpIfFalse => "JUMP_IF_FALSE",
            Op::Call => "CALL",
            Op::Print => "PRINT",
            Op::MakeTensor => "MAKE_TENSOR",
            Op::PersonalitySet => "PERSONALITY_SET",
            Op::PersonalityGet => "PERSONALITY_GET",
            Op::Adapt => "ADAPT",
            Op::Decide => "DECIDE",
            Op::KnowledgeQuery => "KNOWLEDGE_QUERY",
            Op::VoiceSay => "VOICE_SAY",
            Op::Listen => "LISTEN",
        }
    }

    /// Number of operands this opcode actually uses (0-2), for disassembly.
    pub fn operand_count(&self) -> usize {
        match self {
            Op::Nop
            | Op::Return
            | Op::PushNull
            | Op::Pop
            | Op::Dup
            | Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Neg
            | Op::Not
            | Op::Eq
            | Op::Ne
            | Op::Lt
            | Op::Le
            | Op::Gt
            | Op::Ge
            | Op::Print
            | Op::Adapt
            | Op::VoiceSay
            | Op::Listen => 0,
            Op::PushConst
            | Op::PushBool
            | Op::LoadLocal
            | Op::StoreLocal
            | Op::LoadGlobal
            | Op::StoreGlobal
            | Op::Jump
            | Op::JumpIfFalse
            | Op::PersonalityGet
            | Op::KnowledgeQuery => 1,
            Op::Call | Op::MakeTensor | Op::PersonalitySet | Op::Decide => 2,
        }
    }

    /// Check if this opcode modifies control flow.
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            Op::Jump | Op::JumpIfFalse | Op::Call | Op::Return | Op::Decide
        )
    }

    /// Check if this opcode suspends the VM on an external collaborator.
    pub fn is_collaborator(&self) -> bool {
        matches!(self, Op::KnowledgeQuery | Op::VoiceSay | Op::Listen)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One fixed-width instruction.
///
/// The opcode is stored as its raw byte so that artifacts round-trip even if
/// they carry byte values this build does not assign; such bytes fault with
/// IllegalOpcode when dispatched, not when loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: u8,
    pub a: u32,
    pub b: u32,
}

impl Instruction {
    /// Encoded size in the code section: opcode byte + two u32 LE operands.
    pub const ENCODED_SIZE: usize = 9;

    pub fn new(op: Op, a: u32, b: u32) -> Self {
        Self { op: op as u8, a, b }
    }

    pub fn op_only(op: Op) -> Self {
        Self::new(op, 0, 0)
    }

    pub fn with_a(op: Op, a: u32) -> Self {
        Self::new(op, a, 0)
    }

    /// Decode the opcode byte, if assigned.
    pub fn decode(&self) -> Option<Op> {
        Op::from_byte(self.op)
    }
}

/// A deduplicated constant pool entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(String),
    /// A nested compiled sub-unit (e.g. an embedded module)
    Unit(Box<CompiledUnit>),
}

impl Constant {
    pub fn type_name(&self) -> &'static str {
        match self {
            Constant::Int(_) => "int",
            Constant::Float(_) => "float",
            Constant::Str(_) => "str",
            Constant::Unit(_) => "unit",
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{}", n),
            Constant::Float(x) => write!(f, "{}", x),
            Constant::Str(s) => write!(f, "{:?}", s),
            Constant::Unit(u) => write!(f, "<unit: {} instructions>", u.code.len()),
        }
    }
}

/// What a symbol names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Local,
    Global,
    Function,
}

impl SymbolKind {
    pub fn as_byte(&self) -> u8 {
        match self {
            SymbolKind::Local => 0,
            SymbolKind::Global => 1,
            SymbolKind::Function => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<SymbolKind> {
        match byte {
            0 => Some(SymbolKind::Local),
            1 => Some(SymbolKind::Global),
            2 => Some(SymbolKind::Function),
            _ => None,
        }
    }
}

/// One symbol table entry. Retained for introspection and disassembly only;
/// the VM never resolves names at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Local/global slot index, or entry instruction index for functions.
    pub slot: u32,
}

/// A fully compiled unit: everything the VM needs to execute, and everything
/// the container format persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    pub code: Vec<Instruction>,
    pub constants: Vec<Constant>,
    pub symbols: Vec<Symbol>,
    /// Free-form key-value metadata. `compiled_at` is the flagged timestamp
    /// excluded from determinism comparisons.
    pub metadata: BTreeMap<String, String>,
}

impl CompiledUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a symbol by name (first match).
    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Render a human-readable listing of the unit.
    pub fn disassemble(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::new();
        if let Some(name) = self.metadata.get("name") {
            let _ = writeln!(out, "; unit: {}", name);
        }

        let _ = writeln!(out, "; constants: {}", self.constants.len());
        for (i, c) in self.constants.iter().enumerate() {
            let _ = writeln!(out, ";   [{}] {} {}", i, c.type_name(), c);
        }

        if !self.symbols.is_empty() {
            let _ = writeln!(out, "; symbols: {}", self.symbols.len());
            for s in &self.symbols {
                let _ = writeln!(out, ";   {:?} {} -> {}", s.kind, s.name, s.slot);
            }
        }

        for (pc, insn) in self.code.iter().enumerate() {
            let line = match insn.decode() {
                Some(op) => match op.operand_count() {
                    0 => format!("{:4} | {}", pc, op.name()),
                    1 => format!("{:4} | {} {}", pc, op.name(), insn.a),
                    _ => format!("{:4} | {} {}, {}", pc, op.name(), insn.a, insn.b),
                },
                None => format!("{:4} | <illegal 0x{:02x}>", pc, insn.op),
            };
            let _ = writeln!(out, "{}", line);
        }
        out
    }
}
