//! # Nyx Bytecode Compiler
//!
//! One bottom-up walk over the AST:
//! - literals are deduplicated into the constant pool
//! - identifiers resolve against a scope chain built during the walk
//!   (lexical scoping, shadowing allowed in nested scopes)
//! - control flow emits placeholder jumps that are backpatched once the
//!   target instruction index is known
//! - top-level function names are hoisted before statement compilation, so
//!   forward references and mutual recursion work; call sites are patched
//!   after every body is emitted
//!
//! Compilation is pure with respect to the AST: no I/O, no network, no
//! global state. In REPL mode the compiler instance keeps its global scope
//! across `compile` calls and prints the value of a trailing expression
//! statement.

use crate::ast::{
    BinaryOp, CompilationUnit, DecideArm, Expr, ExprKind, FnDef, Item, Literal, Stmt, StmtKind,
    TraitEntry, UnaryOp,
};
use crate::token::Span;
use nyx_error::{Error, ErrorKind, Result};
use nyx_vm::bytecode::{CompiledUnit, Constant, Instruction, Symbol, SymbolKind};
use nyx_vm::personality::{Trait, TRAIT_COUNT};
use nyx_vm::Op;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A placeholder jump target, patched before the unit is returned.
const UNPATCHED: u32 = u32::MAX;

pub struct Compiler {
    repl: bool,
    source_name: Option<String>,
    /// Persistent global scope (REPL mode compiles share it).
    globals: HashMap<String, u32>,
    next_global: u32,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            repl: false,
            source_name: None,
            globals: HashMap::new(),
            next_global: 0,
        }
    }

    /// REPL mode: globals persist across compiles and a trailing expression
    /// statement compiles to a PRINT of its value.
    pub fn repl() -> Self {
        Self {
            repl: true,
            ..Self::new()
        }
    }

    /// Name recorded in the artifact metadata (usually the source file).
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// Compile one unit. `&mut self` so REPL compiles accumulate globals;
    /// a failed compile leaves previously-compiled globals intact.
    pub fn compile(&mut self, unit: &CompilationUnit) -> Result<CompiledUnit> {
        let mut emitter = Emitter::new(self.repl, self.globals.clone(), self.next_global);
        let compiled = emitter.compile_unit(unit, self.source_name.as_deref())?;
        self.globals = emitter.outer_globals();
        self.next_global = emitter.next_global;
        Ok(compiled)
    }
}

struct FnDecl {
    name: String,
    arity: usize,
    entry: u32,
}

/// Scope chain for one function body. Locals are stack slots relative to the
/// frame base.
struct LocalCtx {
    scopes: Vec<HashMap<String, u32>>,
    next_local: u32,
}

struct Emitter {
    repl: bool,
    code: Vec<Instruction>,
    constants: Vec<Constant>,
    symbols: Vec<Symbol>,
    /// Global scope chain; index 0 is the persistent outer scope.
    global_scopes: Vec<HashMap<String, u32>>,
    next_global: u32,
    functions: Vec<FnDecl>,
    fn_indices: HashMap<String, usize>,
    /// (code index, function index) pairs whose CALL target needs patching.
    call_patches: Vec<(usize, usize)>,
    /// Some while compiling inside a function body.
    locals: Option<LocalCtx>,
}

impl Emitter {
    fn new(repl: bool, globals: HashMap<String, u32>, next_global: u32) -> Self {
        Self {
            repl,
            code: Vec::new(),
            constants: Vec::new(),
            symbols: Vec::new(),
            global_scopes: vec![globals],
            next_global,
            functions: Vec::new(),
            fn_indices: HashMap::new(),
            call_patches: Vec::new(),
            locals: None,
        }
    }

    fn outer_globals(&mut self) -> HashMap<String, u32> {
        std::mem::take(&mut self.global_scopes[0])
    }

    fn compile_unit(
        &mut self,
        unit: &CompilationUnit,
        source_name: Option<&str>,
    ) -> Result<CompiledUnit> {
        // Hoist every top-level function so forward references resolve.
        for item in &unit.items {
            if let Item::Function(f) = item {
                if self.fn_indices.contains_key(&f.name) {
                    return Err(Error::parse_failed(format!(
                        "function '{}' is defined twice",
                        f.name
                    ))
                    .with_operation("compiler::compile")
                    .with_position(f.span.line, f.span.column));
                }
                self.fn_indices.insert(f.name.clone(), self.functions.len());
                self.functions.push(FnDecl {
                    name: f.name.clone(),
                    arity: f.params.len(),
                    entry: UNPATCHED,
                });
            }
        }

        // Main body: top-level statements in source order.
        let last_stmt_index = unit
            .items
            .iter()
            .rposition(|i| matches!(i, Item::Statement(_)));
        for (index, item) in unit.items.iter().enumerate() {
            if let Item::Statement(stmt) = item {
                let print_value = self.repl && Some(index) == last_stmt_index;
                self.compile_top_stmt(stmt, print_value)?;
            }
        }
        if !unit.items.is_empty() {
            self.emit(Instruction::op_only(Op::Return));
        }

        // Function bodies after the main body's RETURN.
        for item in &unit.items {
            if let Item::Function(f) = item {
                self.compile_fn(f)?;
            }
        }

        // Patch call sites now that every entry point is known.
        for (code_idx, fn_idx) in std::mem::take(&mut self.call_patches) {
            self.code[code_idx].a = self.functions[fn_idx].entry;
        }

        let mut compiled = CompiledUnit {
            code: std::mem::take(&mut self.code),
            constants: std::mem::take(&mut self.constants),
            symbols: Vec::new(),
            metadata: Default::default(),
        };

        // Symbol table: globals (slot order), then functions, then locals.
        let mut globals: Vec<(&String, &u32)> = self.global_scopes[0].iter().collect();
        globals.sort_by_key(|(_, slot)| **slot);
        for (name, slot) in globals {
            compiled.symbols.push(Symbol {
                name: name.clone(),
                kind: SymbolKind::Global,
                slot: *slot,
            });
        }
        for f in &self.functions {
            compiled.symbols.push(Symbol {
                name: f.name.clone(),
                kind: SymbolKind::Function,
                slot: f.entry,
            });
        }
        compiled.symbols.append(&mut self.symbols);

        compiled
            .metadata
            .insert("name".into(), source_name.unwrap_or("main").to_string());
        compiled
            .metadata
            .insert("compiler_version".into(), env!("CARGO_PKG_VERSION").to_string());
        // The one timestamp field; excluded from determinism comparisons.
        compiled
            .metadata
            .insert("compiled_at".into(), unix_timestamp().to_string());

        Ok(compiled)
    }

    // =========================================================================
    // Emit helpers
    // =========================================================================

    fn emit(&mut self, insn: Instruction) -> usize {
        self.code.push(insn);
        self.code.len() - 1
    }

    fn here(&self) -> u32 {
        self.code.len() as u32
    }

    fn emit_jump(&mut self, op: Op) -> usize {
        self.emit(Instruction::with_a(op, UNPATCHED))
    }

    fn patch(&mut self, at: usize) {
        let target = self.here();
        debug_assert_eq!(self.code[at].a, UNPATCHED, "jump patched twice");
        self.code[at].a = target;
    }

    fn add_constant(&mut self, constant: Constant) -> u32 {
        if let Some(index) = self.constants.iter().position(|c| *c == constant) {
            return index as u32;
        }
        self.constants.push(constant);
        (self.constants.len() - 1) as u32
    }

    fn push_literal(&mut self, literal: &Literal) -> Result<()> {
        match literal {
            Literal::Int(n) => {
                let idx = self.add_constant(Constant::Int(*n));
                self.emit(Instruction::with_a(Op::PushConst, idx));
            }
            Literal::Float(x) => {
                let idx = self.add_constant(Constant::Float(*x));
                self.emit(Instruction::with_a(Op::PushConst, idx));
            }
            Literal::Str(s) => {
                let idx = self.add_constant(Constant::Str(s.clone()));
                self.emit(Instruction::with_a(Op::PushConst, idx));
            }
            Literal::Bool(b) => {
                self.emit(Instruction::with_a(Op::PushBool, *b as u32));
            }
            Literal::Null => {
                self.emit(Instruction::op_only(Op::PushNull));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Scopes
    // =========================================================================

    /// Resolve a name: local scope chain first (innermost wins), then the
    /// global chain.
    fn resolve(&self, name: &str) -> Option<(SymbolKind, u32)> {
        if let Some(ctx) = &self.locals {
            for scope in ctx.scopes.iter().rev() {
                if let Some(slot) = scope.get(name) {
                    return Some((SymbolKind::Local, *slot));
                }
            }
        }
        for scope in self.global_scopes.iter().rev() {
            if let Some(slot) = scope.get(name) {
                return Some((SymbolKind::Global, *slot));
            }
        }
        None
    }

    fn declare_global(&mut self, name: &str) -> u32 {
        let slot = self.next_global;
        self.next_global += 1;
        self.global_scopes
            .last_mut()
            .expect("global scope chain is never empty")
            .insert(name.to_string(), slot);
        slot
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// A top-level statement. `print_value` is the REPL's trailing-expression
    /// echo.
    fn compile_top_stmt(&mut self, stmt: &Stmt, print_value: bool) -> Result<()> {
        match (&stmt.kind, print_value) {
            // `print(...)` already prints; don't echo the null it leaves.
            (StmtKind::Expr(expr), true) if !is_print_call(expr) => {
                self.compile_expr(expr)?;
                self.emit(Instruction::op_only(Op::Print));
                Ok(())
            }
            _ => self.compile_stmt(stmt),
        }
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Let { name, value } => {
                self.compile_expr(value)?;
                match &mut self.locals {
                    Some(ctx) => {
                        // The value just pushed becomes the local's slot.
                        let slot = ctx.next_local;
                        ctx.next_local += 1;
                        ctx.scopes
                            .last_mut()
                            .expect("local scope chain is never empty")
                            .insert(name.clone(), slot);
                        self.symbols.push(Symbol {
                            name: name.clone(),
                            kind: SymbolKind::Local,
                            slot,
                        });
                    }
                    None => {
                        let slot = self.declare_global(name);
                        self.emit(Instruction::with_a(Op::StoreGlobal, slot));
                    }
                }
                Ok(())
            }
            StmtKind::Assign { name, value } => {
                self.compile_expr(value)?;
                match self.resolve(name) {
                    Some((SymbolKind::Local, slot)) => {
                        self.emit(Instruction::with_a(Op::StoreLocal, slot));
                        Ok(())
                    }
                    Some((SymbolKind::Global, slot)) => {
                        self.emit(Instruction::with_a(Op::StoreGlobal, slot));
                        Ok(())
                    }
                    _ => Err(Error::unresolved_symbol(name)
                        .with_operation("compiler::compile")
                        .with_position(stmt.span.line, stmt.span.column)),
                }
            }
            StmtKind::Expr(expr) => {
                // Statement-position print needs no result value at all.
                if let ExprKind::Call { name, args } = &expr.kind {
                    if name == "print" {
                        self.compile_print(args, expr.span)?;
                        return Ok(());
                    }
                }
                self.compile_expr(expr)?;
                self.emit(Instruction::op_only(Op::Pop));
                Ok(())
            }
            StmtKind::If { cond, then_body, else_body } => {
                self.compile_expr(cond)?;
                let to_else = self.emit_jump(Op::JumpIfFalse);
                self.compile_block(then_body)?;
                match else_body {
                    Some(else_body) => {
                        let to_end = self.emit_jump(Op::Jump);
                        self.patch(to_else);
                        self.compile_block(else_body)?;
                        self.patch(to_end);
                    }
                    None => self.patch(to_else),
                }
                Ok(())
            }
            StmtKind::While { cond, body } => {
                let loop_start = self.here();
                self.compile_expr(cond)?;
                let to_end = self.emit_jump(Op::JumpIfFalse);
                self.compile_block(body)?;
                self.emit(Instruction::with_a(Op::Jump, loop_start));
                self.patch(to_end);
                Ok(())
            }
            StmtKind::Return(value) => {
                if self.locals.is_some() {
                    match value {
                        Some(expr) => self.compile_expr(expr)?,
                        None => {
                            self.emit(Instruction::op_only(Op::PushNull));
                        }
                    }
                } else if let Some(expr) = value {
                    // Top-level `return expr;` evaluates for effect, then halts.
                    self.compile_expr(expr)?;
                    self.emit(Instruction::op_only(Op::Pop));
                }
                self.emit(Instruction::op_only(Op::Return));
                Ok(())
            }
            StmtKind::Say { text, emotion } => {
                self.compile_expr(text)?;
                match emotion {
                    Some(expr) => self.compile_expr(expr)?,
                    None => {
                        let idx = self.add_constant(Constant::Str("neutral".into()));
                        self.emit(Instruction::with_a(Op::PushConst, idx));
                    }
                }
                self.emit(Instruction::op_only(Op::VoiceSay));
                Ok(())
            }
            StmtKind::Adapt(signal) => {
                self.compile_expr(signal)?;
                self.emit(Instruction::op_only(Op::Adapt));
                Ok(())
            }
            StmtKind::Personality(entries) => {
                for entry in entries {
                    let t = resolve_trait(entry)?;
                    let idx = self.add_constant(Constant::Float(entry.value));
                    self.emit(Instruction::new(Op::PersonalitySet, t.index() as u32, idx));
                }
                Ok(())
            }
            StmtKind::Decide(arms) => self.compile_decide(arms),
        }
    }

    /// A nested block opens a fresh scope; on exit, function-local lets are
    /// popped off the stack so the frame layout stays consistent.
    fn compile_block(&mut self, body: &[Stmt]) -> Result<()> {
        match &mut self.locals {
            Some(ctx) => ctx.scopes.push(HashMap::new()),
            None => self.global_scopes.push(HashMap::new()),
        }

        let result = body.iter().try_for_each(|stmt| self.compile_stmt(stmt));

        match &mut self.locals {
            Some(ctx) => {
                let scope = ctx.scopes.pop().expect("scope chain unbalanced");
                ctx.next_local -= scope.len() as u32;
                if result.is_ok() {
                    for _ in 0..scope.len() {
                        self.emit(Instruction::op_only(Op::Pop));
                    }
                }
            }
            None => {
                self.global_scopes.pop();
            }
        }
        result
    }

    fn compile_decide(&mut self, arms: &[DecideArm]) -> Result<()> {
        // Dense weight vector per arm, pushed in trait order; the VM pops
        // them back into per-branch rows.
        for arm in arms {
            let mut weights = [0.0f64; TRAIT_COUNT];
            for entry in &arm.weights {
                let t = resolve_trait(entry)?;
                weights[t.index()] = entry.value;
            }
            for w in weights {
                let idx = self.add_constant(Constant::Float(w));
                self.emit(Instruction::with_a(Op::PushConst, idx));
            }
        }
        self.emit(Instruction::new(
            Op::Decide,
            arms.len() as u32,
            TRAIT_COUNT as u32,
        ));

        // Jump table, one entry per arm.
        let table: Vec<usize> = arms.iter().map(|_| self.emit_jump(Op::Jump)).collect();

        let mut ends = Vec::with_capacity(arms.len());
        for (arm, table_entry) in arms.iter().zip(table) {
            self.patch(table_entry);
            self.compile_block(&arm.body)?;
            ends.push(self.emit_jump(Op::Jump));
        }
        for end in ends {
            self.patch(end);
        }
        Ok(())
    }

    fn compile_fn(&mut self, f: &FnDef) -> Result<()> {
        let entry = self.here();
        let fn_idx = self.fn_indices[&f.name];
        self.functions[fn_idx].entry = entry;

        let mut params = HashMap::new();
        for (slot, param) in f.params.iter().enumerate() {
            params.insert(param.clone(), slot as u32);
            self.symbols.push(Symbol {
                name: param.clone(),
                kind: SymbolKind::Local,
                slot: slot as u32,
            });
        }
        self.locals = Some(LocalCtx {
            scopes: vec![params],
            next_local: f.params.len() as u32,
        });

        for stmt in &f.body {
            self.compile_stmt(stmt)?;
        }
        // Implicit `return null;` unless the body already ended with one.
        if !matches!(f.body.last(), Some(s) if matches!(s.kind, StmtKind::Return(_))) {
            self.emit(Instruction::op_only(Op::PushNull));
            self.emit(Instruction::op_only(Op::Return));
        }

        self.locals = None;
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn compile_expr(&mut self, expr: &Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::Literal(lit) => self.push_literal(lit),
            ExprKind::Variable(name) => match self.resolve(name) {
                Some((SymbolKind::Local, slot)) => {
                    self.emit(Instruction::with_a(Op::LoadLocal, slot));
                    Ok(())
                }
                Some((SymbolKind::Global, slot)) => {
                    self.emit(Instruction::with_a(Op::LoadGlobal, slot));
                    Ok(())
                }
                _ => Err(Error::unresolved_symbol(name)
                    .with_operation("compiler::compile")
                    .with_position(expr.span.line, expr.span.column)),
            },
            ExprKind::Unary { op, operand } => {
                self.compile_expr(operand)?;
                self.emit(Instruction::op_only(match op {
                    UnaryOp::Neg => Op::Neg,
                    UnaryOp::Not => Op::Not,
                }));
                Ok(())
            }
            ExprKind::Binary { op: BinaryOp::And, lhs, rhs } => {
                // Short-circuit: keep lhs if falsy, else replace with rhs.
                self.compile_expr(lhs)?;
                self.emit(Instruction::op_only(Op::Dup));
                let to_end = self.emit_jump(Op::JumpIfFalse);
                self.emit(Instruction::op_only(Op::Pop));
                self.compile_expr(rhs)?;
                self.patch(to_end);
                Ok(())
            }
            ExprKind::Binary { op: BinaryOp::Or, lhs, rhs } => {
                self.compile_expr(lhs)?;
                self.emit(Instruction::op_only(Op::Dup));
                let to_rhs = self.emit_jump(Op::JumpIfFalse);
                let to_end = self.emit_jump(Op::Jump);
                self.patch(to_rhs);
                self.emit(Instruction::op_only(Op::Pop));
                self.compile_expr(rhs)?;
                self.patch(to_end);
                Ok(())
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                self.emit(Instruction::op_only(match op {
                    BinaryOp::Add => Op::Add,
                    BinaryOp::Sub => Op::Sub,
                    BinaryOp::Mul => Op::Mul,
                    BinaryOp::Div => Op::Div,
                    BinaryOp::Eq => Op::Eq,
                    BinaryOp::Ne => Op::Ne,
                    BinaryOp::Lt => Op::Lt,
                    BinaryOp::Le => Op::Le,
                    BinaryOp::Gt => Op::Gt,
                    BinaryOp::Ge => Op::Ge,
                    BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
                }));
                Ok(())
            }
            ExprKind::Call { name, args } => {
                if name == "print" {
                    // Expression-position print yields null.
                    self.compile_print(args, expr.span)?;
                    self.emit(Instruction::op_only(Op::PushNull));
                    return Ok(());
                }
                let fn_idx = match self.fn_indices.get(name) {
                    Some(idx) => *idx,
                    None => {
                        return Err(Error::unresolved_symbol(name)
                            .with_operation("compiler::compile")
                            .with_position(expr.span.line, expr.span.column));
                    }
                };
                let arity = self.functions[fn_idx].arity;
                if args.len() != arity {
                    return Err(Error::arity_mismatch(name, arity, args.len())
                        .with_operation("compiler::compile")
                        .with_position(expr.span.line, expr.span.column));
                }
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let at = self.emit(Instruction::new(Op::Call, UNPATCHED, args.len() as u32));
                self.call_patches.push((at, fn_idx));
                Ok(())
            }
            ExprKind::Knowledge { query } => {
                // The operand is a constant-pool string; anything else cannot
                // be pooled.
                let ExprKind::Literal(Literal::Str(text)) = &query.kind else {
                    return Err(Error::invalid_constant(
                        "knowledge(...) takes a string literal",
                    )
                    .with_operation("compiler::compile")
                    .with_position(query.span.line, query.span.column));
                };
                let idx = self.add_constant(Constant::Str(text.clone()));
                self.emit(Instruction::with_a(Op::KnowledgeQuery, idx));
                Ok(())
            }
            ExprKind::Listen { timeout } => {
                match timeout {
                    Some(expr) => self.compile_expr(expr)?,
                    None => {
                        self.emit(Instruction::op_only(Op::PushNull));
                    }
                }
                self.emit(Instruction::op_only(Op::Listen));
                Ok(())
            }
            ExprKind::Tensor { rows } => {
                let row_count = rows.len() as u32;
                let col_count = rows.first().map(|r| r.len()).unwrap_or(0) as u32;
                for row in rows {
                    for element in row {
                        self.compile_expr(element)?;
                    }
                }
                self.emit(Instruction::new(Op::MakeTensor, row_count, col_count));
                Ok(())
            }
        }
    }

    fn compile_print(&mut self, args: &[Expr], span: Span) -> Result<()> {
        if args.len() != 1 {
            return Err(Error::arity_mismatch("print", 1, args.len())
                .with_operation("compiler::compile")
                .with_position(span.line, span.column));
        }
        self.compile_expr(&args[0])?;
        self.emit(Instruction::op_only(Op::Print));
        Ok(())
    }
}

fn is_print_call(expr: &Expr) -> bool {
    matches!(&expr.kind, ExprKind::Call { name, .. } if name == "print")
}

fn resolve_trait(entry: &TraitEntry) -> Result<Trait> {
    Trait::from_name(&entry.name).ok_or_else(|| {
        Error::new(
            ErrorKind::UnresolvedSymbol,
            format!("'{}' is not a personality trait", entry.name),
        )
        .with_operation("compiler::compile")
        .with_context("symbol", entry.name.clone())
        .with_position(entry.span.line, entry.span.column)
    })
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use nyx_vm::collaborator::{KnowledgeAnswer, MockVoice, StaticKnowledge};
    use nyx_vm::{Vm, VmState};

    fn compile(source: &str) -> Result<CompiledUnit> {
        let unit = parse_source(source)?;
        Compiler::new().compile(&unit)
    }

    /// Full pipeline: lex, parse, compile, run on an offline VM.
    fn run(source: &str) -> Vec<String> {
        let compiled = compile(source).expect("compile failed");
        let mut vm = Vm::new(
            Box::new(StaticKnowledge::new()),
            Box::new(MockVoice::new()),
        );
        vm.run(&compiled).expect("run failed");
        vm.take_outputs()
    }

    #[test]
    fn test_print_one_plus_two_shape() {
        let compiled = compile("print(1 + 2);").unwrap();
        assert_eq!(
            compiled.constants,
            vec![Constant::Int(1), Constant::Int(2)]
        );
        let ops: Vec<Op> = compiled.code.iter().map(|i| i.decode().unwrap()).collect();
        assert_eq!(
            ops,
            vec![Op::PushConst, Op::PushConst, Op::Add, Op::Print, Op::Return]
        );
        assert_eq!(run("print(1 + 2);"), ["3"]);
    }

    #[test]
    fn test_constants_are_deduplicated() {
        let compiled = compile("print(1 + 1); print(\"a\" + \"a\");").unwrap();
        assert_eq!(
            compiled.constants,
            vec![Constant::Int(1), Constant::Str("a".into())]
        );
    }

    #[test]
    fn test_empty_source_compiles_to_empty_code() {
        let compiled = compile("").unwrap();
        assert!(compiled.code.is_empty());
        assert!(compiled.constants.is_empty());
    }

    #[test]
    fn test_compilation_is_deterministic_except_timestamp() {
        let source = "fn f(x) { return x * 2; } let a = 3; print(f(a));";
        let first = compile(source).unwrap();
        let second = compile(source).unwrap();
        assert_eq!(first.code, second.code);
        assert_eq!(first.constants, second.constants);
        assert_eq!(first.symbols, second.symbols);
    }

    #[test]
    fn test_unresolved_symbol() {
        let err = compile("print(missing);").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedSymbol);
        assert!(err.context_value("line").is_some());
    }

    #[test]
    fn test_unresolved_assignment_target() {
        let err = compile("ghost = 1;").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedSymbol);
    }

    #[test]
    fn test_arity_mismatch() {
        let err = compile("fn f(a) { return a; } print(f(1, 2));").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArityMismatch);
        assert_eq!(err.context_value("expected"), Some("1"));
        assert_eq!(err.context_value("got"), Some("2"));
    }

    #[test]
    fn test_knowledge_requires_string_literal() {
        let err = compile("let q = \"x\"; let k = knowledge(q);").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConstant);
    }

    #[test]
    fn test_unknown_trait_is_unresolved() {
        let err = compile("personality { charisma: 0.5 }").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedSymbol);
    }

    #[test]
    fn test_if_else_backpatching() {
        assert_eq!(run("if 1 < 2 { print(\"yes\"); } else { print(\"no\"); }"), ["yes"]);
        assert_eq!(run("if 2 < 1 { print(\"yes\"); } else { print(\"no\"); }"), ["no"]);
        assert_eq!(run("if 2 < 1 { print(\"yes\"); }"), Vec::<String>::new());
    }

    #[test]
    fn test_while_loop() {
        let source = "let i = 0; let sum = 0; while i < 5 { sum = sum + i; i = i + 1; } print(sum);";
        assert_eq!(run(source), ["10"]);
    }

    #[test]
    fn test_function_calls_and_recursion() {
        let source = "fn fib(n) { if n < 2 { return n; } return fib(n - 1) + fib(n - 2); } print(fib(10));";
        assert_eq!(run(source), ["55"]);
    }

    #[test]
    fn test_forward_reference_between_functions() {
        let source = "fn even(n) { if n == 0 { return true; } return odd(n - 1); }
                      fn odd(n) { if n == 0 { return false; } return even(n - 1); }
                      print(even(10));";
        assert_eq!(run(source), ["true"]);
    }

    #[test]
    fn test_shadowing_in_nested_scopes() {
        let source = "fn f() { let x = 1; if true { let x = 2; print(x); } print(x); return null; } f();";
        assert_eq!(run(source), ["2", "1"]);
    }

    #[test]
    fn test_short_circuit_and_or() {
        assert_eq!(run("print(false && 1);"), ["false"]);
        assert_eq!(run("print(true && 7);"), ["7"]);
        assert_eq!(run("print(3 || 9);"), ["3"]);
        assert_eq!(run("print(0 || 9);"), ["9"]);
    }

    #[test]
    fn test_personality_and_decide_scenario() {
        let source = r#"
            personality { curiosity: 0.8 }
            decide {
                { curiosity: 1.0 } => { print("explore"); }
                { analytical: 1.0 } => { print("analyze"); }
            }
        "#;
        assert_eq!(run(source), ["explore"]);
    }

    #[test]
    fn test_say_reaches_voice_client() {
        let unit = parse_source("say(\"hello\", emotion: \"warm\"); say(\"plain\");").unwrap();
        let compiled = Compiler::new().compile(&unit).unwrap();

        let voice = std::sync::Arc::new(MockVoice::new());
        let mut vm = Vm::new(Box::new(StaticKnowledge::new()), Box::new(voice.clone()));
        vm.run(&compiled).unwrap();
        assert_eq!(
            voice.spoken(),
            vec![
                ("hello".to_string(), "warm".to_string()),
                ("plain".to_string(), "neutral".to_string()),
            ]
        );
    }

    #[test]
    fn test_knowledge_pipeline() {
        let unit = parse_source("print(knowledge(\"closures\"));").unwrap();
        let compiled = Compiler::new().compile(&unit).unwrap();

        let knowledge = StaticKnowledge::new()
            .with_answer("closures", KnowledgeAnswer::new("captured environments"));
        let mut vm = Vm::new(Box::new(knowledge), Box::new(MockVoice::new()));
        vm.run(&compiled).unwrap();
        assert_eq!(vm.outputs(), ["captured environments"]);
    }

    #[test]
    fn test_tensor_literal_pipeline() {
        assert_eq!(
            run("print(tensor [1.0, 2.0; 3.0, 4.0] + tensor [1.0, 1.0; 1.0, 1.0]);"),
            ["tensor[2, 3; 4, 5]"]
        );
    }

    #[test]
    fn test_adapt_statement() {
        let compiled = compile("adapt(1.0);").unwrap();
        let mut vm = Vm::new(
            Box::new(StaticKnowledge::new()),
            Box::new(MockVoice::new()),
        );
        vm.run(&compiled).unwrap();
        assert!(vm.personality().get(Trait::Curiosity) > 0.5);
        assert_eq!(vm.state(), VmState::Halted);
    }

    #[test]
    fn test_repl_mode_prints_trailing_expression() {
        let mut compiler = Compiler::repl();

        let first = compiler.compile(&parse_source("let x = 40;").unwrap()).unwrap();
        let second = compiler.compile(&parse_source("x + 2").unwrap()).unwrap();

        let mut vm = Vm::new(
            Box::new(StaticKnowledge::new()),
            Box::new(MockVoice::new()),
        );
        vm.run(&first).unwrap();
        vm.run(&second).unwrap();
        assert_eq!(vm.outputs(), ["42"]);
    }

    #[test]
    fn test_repl_does_not_double_print() {
        let mut compiler = Compiler::repl();
        let compiled = compiler.compile(&parse_source("print(7)").unwrap()).unwrap();

        let mut vm = Vm::new(
            Box::new(StaticKnowledge::new()),
            Box::new(MockVoice::new()),
        );
        vm.run(&compiled).unwrap();
        assert_eq!(vm.outputs(), ["7"]);
    }

    #[test]
    fn test_symbol_table_contents() {
        let compiled = compile("let total = 1; fn f(a) { let b = a; return b; }").unwrap();
        let global = compiled.symbol("total").unwrap();
        assert_eq!(global.kind, SymbolKind::Global);
        let function = compiled.symbol("f").unwrap();
        assert_eq!(function.kind, SymbolKind::Function);
        assert!(compiled
            .symbols
            .iter()
            .any(|s| s.name == "b" && s.kind == SymbolKind::Local));
    }

    #[test]
    fn test_metadata_fields() {
        let unit = parse_source("print(1);").unwrap();
        let compiled = Compiler::new()
            .with_source_name("hello.nyx")
            .compile(&unit)
            .unwrap();
        assert_eq!(compiled.metadata.get("name").map(String::as_str), Some("hello.nyx"));
        assert!(compiled.metadata.contains_key("compiler_version"));
        assert!(compiled.metadata.contains_key("compiled_at"));
    }

    #[test]
    fn test_parse_error_isolation_still_yields_an_artifact() {
        // Item 1 is broken; items 0 and 2 still parse, compile and run.
        let source = "print(1); let broken = ; print(2);";
        let (unit, errors) = crate::parser::Parser::new(crate::lexer::tokenize(source))
            .parse_program();
        assert_eq!(errors.len(), 1);

        let compiled = Compiler::new().compile(&unit).unwrap();
        let mut vm = Vm::new(
            Box::new(StaticKnowledge::new()),
            Box::new(MockVoice::new()),
        );
        vm.run(&compiled).unwrap();
        assert_eq!(vm.outputs(), ["1", "2"]);
    }

    #[test]
    fn test_round_trip_through_container() {
        let compiled = compile(
            "personality { focus: 0.9 } fn f(x) { return x + 1; } print(f(41));",
        )
        .unwrap();
        let bytes = nyx_vm::container::serialize(&compiled);
        let loaded = nyx_vm::container::deserialize(&bytes).unwrap();
        assert_eq!(loaded, compiled);

        let mut vm = Vm::new(
            Box::new(StaticKnowledge::new()),
            Box::new(MockVoice::new()),
        );
        vm.run(&loaded).unwrap();
        assert_eq!(vm.outputs(), ["42"]);
    }
}
