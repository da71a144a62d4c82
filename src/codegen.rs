//! Bytecode generation: walks a resolved AST and emits a [`ClassFile`] ready
//! to write to disk.
//!
//! One [`MethodCodeGen`] per JVM method tracks an abstract [`Frame`] (the
//! operand stack and local-variable array, in words) alongside the raw code
//! bytes, so every opcode emission keeps the two in lockstep. Branch targets
//! are recorded as they're reached (`record_frame`); once a method's body is
//! fully emitted, [`resolve_stack_map_frames`] sorts them by `pc`, computes
//! each `offset_delta`, and chooses the smallest encoding family that
//! expresses the transition from the previous recorded frame.
//!
//! Resolution has already rejected any program that would make codegen fail:
//! an internal inconsistency found here (an un-resolved call, a local with no
//! recorded slot) is a compiler bug, not a user error, and is reported via
//! `panic!` rather than a `Result` — see [`CodeGenError`].

use crate::ast::{Ast, NodeId, NodeKind};
use crate::classfile::attributes::{
    Attribute, CodeAttribute, LineNumberEntry, StackMapFrameEntry, VerificationInfo,
};
use crate::classfile::constant_pool::ConstantPool;
use crate::classfile::opcodes::{self, LocalKind};
use crate::classfile::{ClassFile, MemberAccessFlags, MethodInfo};
use crate::descriptor;
use crate::lexer::{LineTable, Token, TokenKind, lexeme};
use crate::resolver::{Intrinsic, ResolveResult, ResolvedCall};
use crate::types::{MethodSignature, TypeId, TypeKind, TypeTable};
use std::fmt;

/// Mirrors [`crate::error::CompileError`]'s note about phase-local error
/// enums: code generation has no recoverable error path (every input it
/// sees has already passed resolution), so this exists for symmetry with
/// the other phases rather than being returned from anywhere.
#[derive(Debug)]
pub enum CodeGenError {
    Internal(String),
}

impl fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeGenError::Internal(message) => write!(f, "internal code generator error: {message}"),
        }
    }
}

impl std::error::Error for CodeGenError {}

/// Which JVM category a value occupies at runtime, independent of its
/// surface `TypeId` — `IntegerLiteral` and `Byte`/`Short`/`Char` all share
/// `Int`'s opcodes and slot width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuntimeKind {
    Int,
    Long,
    Float,
    Double,
    Ref,
}

fn runtime_kind(table: &TypeTable, ty: TypeId) -> RuntimeKind {
    match &table.get(ty).kind {
        TypeKind::Boolean | TypeKind::Byte | TypeKind::Char | TypeKind::Short | TypeKind::Int => {
            RuntimeKind::Int
        }
        TypeKind::IntegerLiteral { possible } => {
            if possible.contains(crate::types::IntegerKinds::INT) {
                RuntimeKind::Int
            } else {
                RuntimeKind::Long
            }
        }
        TypeKind::Long => RuntimeKind::Long,
        TypeKind::Float => RuntimeKind::Float,
        TypeKind::Double => RuntimeKind::Double,
        _ => RuntimeKind::Ref,
    }
}

/// An `IntegerLiteral`'s own runtime type, used when emitting the literal
/// itself (as opposed to the concrete type a parent expression settled on
/// via widening).
fn literal_natural_type(table: &TypeTable, ty: TypeId) -> TypeId {
    match &table.get(ty).kind {
        TypeKind::IntegerLiteral { possible } => {
            if possible.contains(crate::types::IntegerKinds::INT) {
                TypeId::INT
            } else {
                TypeId::LONG
            }
        }
        _ => ty,
    }
}

fn local_kind_of(kind: RuntimeKind) -> LocalKind {
    match kind {
        RuntimeKind::Int => LocalKind::Int,
        RuntimeKind::Long => LocalKind::Long,
        RuntimeKind::Float => LocalKind::Float,
        RuntimeKind::Double => LocalKind::Double,
        RuntimeKind::Ref => LocalKind::Reference,
    }
}

fn word_count(kind: RuntimeKind) -> u16 {
    match kind {
        RuntimeKind::Long | RuntimeKind::Double => 2,
        _ => 1,
    }
}

fn verification_info_of(table: &TypeTable, pool: &mut ConstantPool, ty: TypeId) -> VerificationInfo {
    match runtime_kind(table, ty) {
        RuntimeKind::Int => VerificationInfo::Integer,
        RuntimeKind::Long => VerificationInfo::Long,
        RuntimeKind::Float => VerificationInfo::Float,
        RuntimeKind::Double => VerificationInfo::Double,
        RuntimeKind::Ref => {
            let descriptor = descriptor::descriptor_of(table, ty);
            let internal_name = descriptor
                .strip_prefix('L')
                .and_then(|s| s.strip_suffix(';'))
                .unwrap_or(&descriptor);
            VerificationInfo::Object {
                class_index: pool.add_class(internal_name),
            }
        }
    }
}

fn verification_info_words(info: &VerificationInfo) -> u16 {
    match info {
        VerificationInfo::Long | VerificationInfo::Double => 2,
        _ => 1,
    }
}

/// The abstract evaluation stack and local-variable array a method's
/// bytecode is built against. Entries are logical (one per value, matching
/// `StackMapTable`'s `verification_type_info` list); word counts are
/// tracked alongside for `max_stack`/`max_locals`.
#[derive(Debug, Clone)]
struct Frame {
    locals: Vec<VerificationInfo>,
    stack: Vec<VerificationInfo>,
    locals_words: u16,
    stack_words: u16,
}

impl Frame {
    fn new() -> Frame {
        Frame {
            locals: Vec::new(),
            stack: Vec::new(),
            locals_words: 0,
            stack_words: 0,
        }
    }

    fn declare_local(&mut self, info: VerificationInfo) {
        self.locals_words += verification_info_words(&info);
        self.locals.push(info);
    }

    fn push(&mut self, info: VerificationInfo) {
        self.stack_words += verification_info_words(&info);
        self.stack.push(info);
    }

    fn pop(&mut self) -> VerificationInfo {
        let info = self.stack.pop().expect("frame underflow");
        self.stack_words -= verification_info_words(&info);
        info
    }

    fn pop_words(&mut self, mut words: u16) {
        while words > 0 {
            let info = self.pop();
            words -= verification_info_words(&info);
        }
    }

    /// `locals` is logical (one entry per variable); JVM local slots are
    /// physical (a `Long`/`Double` local occupies two). Walk the logical
    /// entries accumulating physical width until `slot` is reached.
    fn local_at_physical_slot(&self, slot: u16) -> &VerificationInfo {
        let mut physical = 0u16;
        for info in &self.locals {
            if physical == slot {
                return info;
            }
            physical += verification_info_words(info);
        }
        panic!("no local declared at physical slot {slot}");
    }
}

struct PendingFrame {
    pc: u32,
    locals: Vec<VerificationInfo>,
    stack: Vec<VerificationInfo>,
}

/// What [`MethodCodeGen::finish`] hands back to the class-level assembler.
struct MethodCode {
    code: Vec<u8>,
    max_stack: u16,
    max_locals: u16,
    stack_map: Vec<StackMapFrameEntry>,
}

/// Per-method code generator. Holds the live [`Frame`], the raw code bytes,
/// and everything needed to mint new constant-pool entries and resolve
/// local names/descriptors against the resolved AST's side tables.
struct MethodCodeGen<'a> {
    source: &'a [u8],
    tokens: &'a [Token],
    table: &'a mut TypeTable,
    resolve: &'a ResolveResult,
    pool: &'a mut ConstantPool,
    this_internal_name: &'a str,
    return_type: TypeId,
    code: Vec<u8>,
    frame: Frame,
    initial_locals: Vec<VerificationInfo>,
    pending: Vec<PendingFrame>,
    max_stack_words: u16,
    scratch_base: u16,
}

impl<'a> MethodCodeGen<'a> {
    fn new(
        source: &'a [u8],
        tokens: &'a [Token],
        table: &'a mut TypeTable,
        resolve: &'a ResolveResult,
        pool: &'a mut ConstantPool,
        this_internal_name: &'a str,
        return_type: TypeId,
    ) -> Self {
        MethodCodeGen {
            source,
            tokens,
            table,
            resolve,
            pool,
            this_internal_name,
            return_type,
            code: Vec::new(),
            frame: Frame::new(),
            initial_locals: Vec::new(),
            pending: Vec::new(),
            max_stack_words: 0,
            scratch_base: 0,
        }
    }

    fn token_text(&self, token_i: usize) -> &str {
        lexeme(self.source, &self.tokens[token_i])
    }

    fn pc(&self) -> usize {
        self.code.len()
    }

    fn emit1(&mut self, opcode: u8) {
        self.code.push(opcode);
    }

    fn emit_u2(&mut self, v: u16) {
        self.code.extend_from_slice(&v.to_be_bytes());
    }

    fn frame_push(&mut self, info: VerificationInfo) {
        self.frame.push(info);
        self.max_stack_words = self.max_stack_words.max(self.frame.stack_words);
    }

    fn frame_pop(&mut self) -> VerificationInfo {
        self.frame.pop()
    }

    fn frame_pop_words(&mut self, words: u16) {
        self.frame.pop_words(words);
    }

    fn declare_param_or_local(&mut self, ty: TypeId) {
        let info = verification_info_of(self.table, self.pool, ty);
        self.frame.declare_local(info);
    }

    fn capture_initial_frame(&mut self) {
        self.initial_locals = self.frame.locals.clone();
        self.scratch_base = self.frame.locals_words;
    }

    fn record_frame(&mut self, pc: usize) {
        self.pending.push(PendingFrame {
            pc: pc as u32,
            locals: self.frame.locals.clone(),
            stack: self.frame.stack.clone(),
        });
    }

    // -- jumps -----------------------------------------------------------

    /// Emits `opcode` followed by a two-byte placeholder; returns the
    /// placeholder's absolute offset for [`Self::patch_jump`].
    fn emit_branch_placeholder(&mut self, opcode: u8) -> usize {
        self.emit1(opcode);
        let at = self.pc();
        self.emit_u2(0);
        at
    }

    fn patch_jump(&mut self, placeholder: usize, target_pc: usize) {
        let delta = target_pc as i32 - (placeholder as i32 - 1);
        let bytes = (delta as u16).to_be_bytes();
        self.code[placeholder] = bytes[0];
        self.code[placeholder + 1] = bytes[1];
    }

    // -- generic opcode emission ------------------------------------------

    fn emit_simple(&mut self, opcode: u8) {
        self.emit1(opcode);
        if opcode == opcodes::DUP {
            let top = self.frame.stack.last().cloned().expect("dup requires a stack value");
            self.frame_push(top);
            return;
        }
        if let Some((pop_words, push_words)) = opcodes::simple_stack_effect(opcode) {
            self.frame_pop_words(pop_words);
            if push_words > 0 {
                self.frame_push(pushed_kind_for_opcode(opcode));
            }
        }
    }

    fn emit_load(&mut self, kind: LocalKind, slot: u16) {
        self.emit1(kind.load_opcode());
        self.emit1(slot as u8);
        let info = match kind {
            LocalKind::Int => VerificationInfo::Integer,
            LocalKind::Long => VerificationInfo::Long,
            LocalKind::Float => VerificationInfo::Float,
            LocalKind::Double => VerificationInfo::Double,
            LocalKind::Reference => self.frame.local_at_physical_slot(slot).clone(),
        };
        self.frame_push(info);
    }

    fn emit_store(&mut self, kind: LocalKind, slot: u16) {
        self.emit1(kind.store_opcode());
        self.emit1(slot as u8);
        self.frame_pop();
    }

    /// `ldc`'s operand is a single byte; once constant-pool interning pushes
    /// an index past 255 (routine for non-trivial programs), `ldc_w` carries
    /// the same payload with a two-byte operand instead. Silently truncating
    /// to `u8` would reference whatever entry happens to sit at the low byte.
    fn emit_ldc(&mut self, index: u16) {
        if index <= u8::MAX as u16 {
            self.emit1(opcodes::LDC);
            self.code.push(index as u8);
        } else {
            self.emit1(opcodes::LDC_W);
            self.emit_u2(index);
        }
    }

    // -- function entry / exit --------------------------------------------

    fn generate_body(&mut self, ast: &Ast, body: NodeId) {
        self.capture_initial_frame();
        let stmts = ast.statement_list(ast.get(body)).to_vec();
        for &stmt in &stmts {
            self.emit_statement(ast, stmt);
        }
        if self.return_type == TypeId::UNIT {
            let ends_in_return = stmts
                .last()
                .map(|&s| ast.get(s).kind == NodeKind::Return)
                .unwrap_or(false);
            if !ends_in_return {
                self.emit1(opcodes::RETURN);
            }
        }
    }

    fn finish(mut self) -> MethodCode {
        let stack_map = resolve_stack_map_frames(&self.initial_locals, self.pending);
        let max_locals = self.frame.locals_words.max(self.scratch_base);
        MethodCode {
            code: std::mem::take(&mut self.code),
            max_stack: self.max_stack_words,
            max_locals,
            stack_map,
        }
    }

    // -- statements --------------------------------------------------------

    fn emit_statement(&mut self, ast: &Ast, stmt: NodeId) {
        match ast.get(stmt).kind {
            NodeKind::VarDecl => self.emit_var_decl(ast, stmt),
            NodeKind::If => self.generate_if(ast, stmt, false),
            NodeKind::While => self.generate_while(ast, stmt),
            NodeKind::Return => self.emit_return(ast, stmt),
            NodeKind::Assign => self.emit_assign(ast, stmt),
            NodeKind::Block => {
                for &inner in ast.statement_list(ast.get(stmt)).to_vec().iter() {
                    self.emit_statement(ast, inner);
                }
            }
            _ => {
                self.emit_expr(ast, stmt);
                let ty = ast.get(stmt).type_i.unwrap_or(TypeId::UNIT);
                if ty != TypeId::UNIT {
                    let words = word_count(self.expr_runtime_kind(ast, stmt));
                    self.frame_pop_words(words);
                    self.emit1(if words == 2 { opcodes::POP2 } else { opcodes::POP });
                }
            }
        }
    }

    fn emit_var_decl(&mut self, ast: &Ast, stmt: NodeId) {
        let node = ast.get(stmt);
        let init = node.lhs;
        let slot_info = *self
            .resolve
            .locals
            .get(&stmt)
            .expect("VarDecl must have a resolved local slot");
        self.emit_expr(ast, init);
        self.coerce(ast, init, slot_info.type_id);
        let kind = local_kind_of(runtime_kind(self.table, slot_info.type_id));
        self.emit_store(kind, slot_info.slot);
        self.declare_param_or_local(slot_info.type_id);
    }

    fn emit_assign(&mut self, ast: &Ast, stmt: NodeId) {
        let node = ast.get(stmt);
        let target = node.lhs;
        let value = node.rhs;
        let slot_info = *self
            .resolve
            .locals
            .get(&target)
            .expect("assignment target must have a resolved local slot");
        self.emit_expr(ast, value);
        self.coerce(ast, value, slot_info.type_id);
        let kind = local_kind_of(runtime_kind(self.table, slot_info.type_id));
        self.emit_store(kind, slot_info.slot);
    }

    fn emit_return(&mut self, ast: &Ast, stmt: NodeId) {
        let node = ast.get(stmt);
        if node.lhs == NodeId::NONE {
            self.emit1(opcodes::RETURN);
            return;
        }
        self.emit_expr(ast, node.lhs);
        self.coerce(ast, node.lhs, self.return_type);
        self.frame_pop();
        let opcode = match runtime_kind(self.table, self.return_type) {
            RuntimeKind::Int => opcodes::IRETURN,
            RuntimeKind::Long => opcodes::LRETURN,
            RuntimeKind::Float => opcodes::FRETURN,
            RuntimeKind::Double => opcodes::DRETURN,
            RuntimeKind::Ref => opcodes::ARETURN,
        };
        self.emit1(opcode);
    }

    /// `if`/`while`/the branches of a logical operator share one shape:
    /// condition, conditional skip, body, restore-frame-and-continue. This
    /// covers both the statement form of `if` (no value) and its use as an
    /// expression (each branch must leave one value, coerced to the
    /// `if`'s own resolved type, on the stack).
    fn generate_if(&mut self, ast: &Ast, node_id: NodeId, produce_value: bool) {
        let node = ast.get(node_id);
        let cond = node.lhs;
        let then_branch = node.rhs;
        let else_branch = ast.statement_list(node).first().copied();
        let result_type = ast.get(node_id).type_i.unwrap_or(TypeId::UNIT);

        self.emit_expr(ast, cond);
        self.frame_pop();
        let jump_to_else = self.emit_branch_placeholder(opcodes::IFEQ);
        let frame_before = self.frame.clone();

        if produce_value {
            self.emit_branch_value(ast, then_branch, result_type);
        } else {
            self.emit_statement(ast, then_branch);
        }

        match else_branch {
            Some(else_branch) => {
                let jump_to_end = self.emit_branch_placeholder(opcodes::GOTO);
                let else_pc = self.pc();
                self.patch_jump(jump_to_else, else_pc);
                self.frame = frame_before;
                self.record_frame(else_pc);

                if produce_value {
                    self.emit_branch_value(ast, else_branch, result_type);
                } else {
                    self.emit_statement(ast, else_branch);
                }

                let end_pc = self.pc();
                self.patch_jump(jump_to_end, end_pc);
                self.record_frame(end_pc);
            }
            None => {
                let end_pc = self.pc();
                self.patch_jump(jump_to_else, end_pc);
                self.record_frame(end_pc);
            }
        }
    }

    /// Emits an `if`-expression branch (a bare expression or a block whose
    /// last statement is one), coercing its value to `result_type` so both
    /// branches leave the same runtime shape on the stack.
    fn emit_branch_value(&mut self, ast: &Ast, branch: NodeId, result_type: TypeId) {
        match ast.get(branch).kind {
            NodeKind::Block => {
                let stmts = ast.statement_list(ast.get(branch)).to_vec();
                for (i, &stmt) in stmts.iter().enumerate() {
                    if i + 1 == stmts.len() && is_value_statement(ast, stmt) {
                        self.emit_expr(ast, stmt);
                        self.coerce(ast, stmt, result_type);
                    } else {
                        self.emit_statement(ast, stmt);
                    }
                }
            }
            kind if is_value_kind(kind) => {
                self.emit_expr(ast, branch);
                self.coerce(ast, branch, result_type);
            }
            _ => self.emit_statement(ast, branch),
        }
    }

    fn generate_while(&mut self, ast: &Ast, stmt: NodeId) {
        let node = ast.get(stmt);
        let cond = node.lhs;
        let body = node.rhs;

        let loop_start = self.pc();
        self.record_frame(loop_start);
        self.emit_expr(ast, cond);
        self.frame_pop();
        let jump_to_end = self.emit_branch_placeholder(opcodes::IFEQ);

        self.emit_statement(ast, body);
        let jump_back = self.emit_branch_placeholder(opcodes::GOTO);
        self.patch_jump(jump_back, loop_start);

        let end_pc = self.pc();
        self.patch_jump(jump_to_end, end_pc);
        self.record_frame(end_pc);
    }

    // -- expressions ---------------------------------------------------------

    /// The runtime category a (possibly literal) expression node will have
    /// once emitted — recurses through `Grouping` and resolves a literal's
    /// own natural type rather than any concretized parent type.
    fn expr_runtime_kind(&self, ast: &Ast, node_id: NodeId) -> RuntimeKind {
        let node = ast.get(node_id);
        match node.kind {
            NodeKind::Grouping => self.expr_runtime_kind(ast, node.lhs),
            NodeKind::IntegerLiteral => {
                runtime_kind(self.table, literal_natural_type(self.table, node.type_i.unwrap()))
            }
            _ => runtime_kind(self.table, node.type_i.unwrap_or(TypeId::ANY)),
        }
    }

    /// Coerces the value just emitted for `node_id` (still on top of the
    /// frame) from its own runtime kind to `target`'s, emitting a numeric
    /// widening conversion if needed.
    fn coerce(&mut self, ast: &Ast, node_id: NodeId, target: TypeId) {
        let from_kind = self.expr_runtime_kind(ast, node_id);
        let to_kind = runtime_kind(self.table, target);
        if from_kind == to_kind {
            return;
        }
        let opcode = match (from_kind, to_kind) {
            (RuntimeKind::Int, RuntimeKind::Long) => opcodes::I2L,
            (RuntimeKind::Int, RuntimeKind::Float) => opcodes::I2F,
            (RuntimeKind::Int, RuntimeKind::Double) => opcodes::I2D,
            (RuntimeKind::Long, RuntimeKind::Float) => opcodes::L2F,
            (RuntimeKind::Long, RuntimeKind::Double) => opcodes::L2D,
            (RuntimeKind::Float, RuntimeKind::Double) => opcodes::F2D,
            _ => return,
        };
        self.emit1(opcode);
        self.frame_pop();
        self.frame_push(verification_info_of(self.table, self.pool, target));
    }

    fn emit_expr(&mut self, ast: &Ast, expr: NodeId) {
        let node = ast.get(expr);
        match node.kind {
            NodeKind::IntegerLiteral => self.emit_integer_literal(ast, expr),
            NodeKind::StringLiteral => self.emit_string_literal(ast, expr),
            NodeKind::BooleanLiteral => self.emit_boolean_literal(ast, expr),
            NodeKind::FloatLiteral => {
                // The lexer never produces a `Number` token containing a
                // `.`, so the parser never builds this node; kept only so
                // the match stays exhaustive.
                unreachable!("floating-point literals are not accepted by the lexer")
            }
            NodeKind::Identifier => self.emit_identifier(ast, expr),
            NodeKind::Grouping => self.emit_expr(ast, node.lhs),
            NodeKind::UnaryOp => self.emit_unary(ast, expr),
            NodeKind::BinaryOp => self.emit_binary(ast, expr),
            NodeKind::LogicalAnd => self.emit_logical_and(ast, expr),
            NodeKind::LogicalOr => self.emit_logical_or(ast, expr),
            NodeKind::Call => self.emit_call(ast, expr),
            NodeKind::If => self.generate_if(ast, expr, true),
            NodeKind::Navigation | NodeKind::Error => {
                unreachable!("diagnostics from this node must have aborted before codegen")
            }
            other => unreachable!("{other:?} cannot appear in expression position"),
        }
    }

    fn emit_integer_literal(&mut self, ast: &Ast, expr: NodeId) {
        let ty = ast.get(expr).type_i.unwrap();
        let natural = literal_natural_type(self.table, ty);
        let text = self.token_text(ast.get(expr).main_token_i).to_string();
        let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
        let value: i64 = digits.parse().unwrap_or(i64::MAX);

        if natural == TypeId::LONG {
            match value {
                0 => self.emit_simple(opcodes::LCONST_0),
                1 => self.emit_simple(opcodes::LCONST_1),
                _ => {
                    let index = self.pool.add_long(value);
                    self.emit1(opcodes::LDC2_W);
                    self.emit_u2(index);
                    self.frame_push(VerificationInfo::Long);
                }
            }
            return;
        }

        match value {
            -1..=5 => {
                let opcode = opcodes::ICONST_M1 + (value + 1) as u8;
                self.emit_simple(opcode);
            }
            -128..=127 => {
                self.emit1(opcodes::BIPUSH);
                self.code.push(value as i8 as u8);
                self.frame_push(VerificationInfo::Integer);
            }
            -32768..=32767 => {
                self.emit1(opcodes::SIPUSH);
                self.emit_u2(value as i16 as u16);
                self.frame_push(VerificationInfo::Integer);
            }
            _ => {
                let index = self.pool.add_integer(value as i32);
                self.emit_ldc(index);
                self.frame_push(VerificationInfo::Integer);
            }
        }
    }

    fn emit_string_literal(&mut self, ast: &Ast, expr: NodeId) {
        let text = self.token_text(ast.get(expr).main_token_i);
        let value = text.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(text);
        let index = self.pool.add_string(value);
        self.emit_ldc(index);
        self.frame_push(VerificationInfo::Object {
            class_index: self.pool.add_class("java/lang/String"),
        });
    }

    fn emit_boolean_literal(&mut self, ast: &Ast, expr: NodeId) {
        let kind = self.tokens[ast.get(expr).main_token_i].kind;
        self.emit_simple(if kind == TokenKind::True {
            opcodes::ICONST_1
        } else {
            opcodes::ICONST_0
        });
    }

    fn emit_identifier(&mut self, ast: &Ast, expr: NodeId) {
        let slot_info = *self
            .resolve
            .locals
            .get(&expr)
            .expect("Identifier must have a resolved local slot");
        let kind = local_kind_of(runtime_kind(self.table, slot_info.type_id));
        self.emit_load(kind, slot_info.slot);
    }

    fn emit_unary(&mut self, ast: &Ast, expr: NodeId) {
        let node = ast.get(expr);
        let operand = node.lhs;
        let op = self.tokens[node.main_token_i].kind;
        self.emit_expr(ast, operand);
        match op {
            TokenKind::Bang => {
                // Boolean is represented as 0/1 on the stack; `!x` is `x ^ 1`.
                self.emit_simple(opcodes::ICONST_1);
                self.emit_simple(opcodes::IXOR);
            }
            TokenKind::Minus => {
                self.coerce(ast, operand, node.type_i.unwrap());
                let opcode = match runtime_kind(self.table, node.type_i.unwrap()) {
                    RuntimeKind::Int => opcodes::INEG,
                    RuntimeKind::Long => opcodes::LNEG,
                    RuntimeKind::Float => opcodes::FNEG,
                    RuntimeKind::Double => opcodes::DNEG,
                    RuntimeKind::Ref => unreachable!("unary '-' never resolves to a reference type"),
                };
                self.emit_simple(opcode);
            }
            _ => unreachable!("UnaryOp main_token_i must be '-' or '!'"),
        }
    }

    fn emit_logical_and(&mut self, ast: &Ast, expr: NodeId) {
        let node = ast.get(expr);
        let (lhs, rhs) = (node.lhs, node.rhs);
        self.emit_expr(ast, lhs);
        self.frame_pop();
        let jump_to_false = self.emit_branch_placeholder(opcodes::IFEQ);
        let frame_before = self.frame.clone();

        self.emit_expr(ast, rhs);
        let jump_to_end = self.emit_branch_placeholder(opcodes::GOTO);

        let false_pc = self.pc();
        self.patch_jump(jump_to_false, false_pc);
        self.frame = frame_before;
        self.record_frame(false_pc);
        self.emit_simple(opcodes::ICONST_0);

        let end_pc = self.pc();
        self.patch_jump(jump_to_end, end_pc);
        self.record_frame(end_pc);
    }

    fn emit_logical_or(&mut self, ast: &Ast, expr: NodeId) {
        let node = ast.get(expr);
        let (lhs, rhs) = (node.lhs, node.rhs);
        self.emit_expr(ast, lhs);
        self.frame_pop();
        let jump_to_true = self.emit_branch_placeholder(opcodes::IFNE);
        let frame_before = self.frame.clone();

        self.emit_expr(ast, rhs);
        let jump_to_end = self.emit_branch_placeholder(opcodes::GOTO);

        let true_pc = self.pc();
        self.patch_jump(jump_to_true, true_pc);
        self.frame = frame_before;
        self.record_frame(true_pc);
        self.emit_simple(opcodes::ICONST_1);

        let end_pc = self.pc();
        self.patch_jump(jump_to_end, end_pc);
        self.record_frame(end_pc);
    }

    /// Common numeric type of two (possibly literal) operands, following
    /// the same Double > Float > Long > Int rank the resolver uses — `None`
    /// if either side isn't numeric (reference/boolean comparison).
    fn common_numeric_type(&self, a: RuntimeKind, b: RuntimeKind) -> Option<RuntimeKind> {
        let rank = |k: RuntimeKind| match k {
            RuntimeKind::Double => 4,
            RuntimeKind::Float => 3,
            RuntimeKind::Long => 2,
            RuntimeKind::Int => 1,
            RuntimeKind::Ref => return None::<u8>,
        };
        let (ra, rb) = (rank(a)?, rank(b)?);
        Some(if ra >= rb { a } else { b })
    }

    fn to_type_id(kind: RuntimeKind) -> TypeId {
        match kind {
            RuntimeKind::Int => TypeId::INT,
            RuntimeKind::Long => TypeId::LONG,
            RuntimeKind::Float => TypeId::FLOAT,
            RuntimeKind::Double => TypeId::DOUBLE,
            RuntimeKind::Ref => TypeId::ANY,
        }
    }

    fn emit_binary(&mut self, ast: &Ast, expr: NodeId) {
        let node = ast.get(expr);
        let op = self.tokens[node.main_token_i].kind;
        match op {
            TokenKind::EqEq | TokenKind::BangEq => self.emit_equality(ast, expr, op),
            TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => {
                self.emit_relational(ast, expr, op)
            }
            TokenKind::Plus | TokenKind::Minus | TokenKind::Star | TokenKind::Slash | TokenKind::Percent => {
                self.emit_arithmetic(ast, expr, op)
            }
            _ => unreachable!("BinaryOp main_token_i must be a binary operator"),
        }
    }

    fn emit_arithmetic(&mut self, ast: &Ast, expr: NodeId, op: TokenKind) {
        let node = ast.get(expr);
        let (lhs, rhs) = (node.lhs, node.rhs);
        let result_type = node.type_i.unwrap();

        self.emit_expr(ast, lhs);
        self.coerce(ast, lhs, result_type);
        self.emit_expr(ast, rhs);
        self.coerce(ast, rhs, result_type);

        let kind = runtime_kind(self.table, result_type);
        let opcode = match (op, kind) {
            (TokenKind::Plus, RuntimeKind::Int) => opcodes::IADD,
            (TokenKind::Plus, RuntimeKind::Long) => opcodes::LADD,
            (TokenKind::Plus, RuntimeKind::Float) => opcodes::FADD,
            (TokenKind::Plus, RuntimeKind::Double) => opcodes::DADD,
            (TokenKind::Minus, RuntimeKind::Int) => opcodes::ISUB,
            (TokenKind::Minus, RuntimeKind::Long) => opcodes::LSUB,
            (TokenKind::Minus, RuntimeKind::Float) => opcodes::FSUB,
            (TokenKind::Minus, RuntimeKind::Double) => opcodes::DSUB,
            (TokenKind::Star, RuntimeKind::Int) => opcodes::IMUL,
            (TokenKind::Star, RuntimeKind::Long) => opcodes::LMUL,
            (TokenKind::Star, RuntimeKind::Float) => opcodes::FMUL,
            (TokenKind::Star, RuntimeKind::Double) => opcodes::DMUL,
            (TokenKind::Slash, RuntimeKind::Int) => opcodes::IDIV,
            (TokenKind::Slash, RuntimeKind::Long) => opcodes::LDIV,
            (TokenKind::Slash, RuntimeKind::Float) => opcodes::FDIV,
            (TokenKind::Slash, RuntimeKind::Double) => opcodes::DDIV,
            (TokenKind::Percent, RuntimeKind::Int) => opcodes::IREM,
            (TokenKind::Percent, RuntimeKind::Long) => opcodes::LREM,
            (TokenKind::Percent, RuntimeKind::Float) => opcodes::FREM,
            (TokenKind::Percent, RuntimeKind::Double) => opcodes::DREM,
            _ => unreachable!("arithmetic operator/kind combination must be numeric"),
        };
        self.emit_simple(opcode);
    }

    /// Shared by [`Self::emit_equality`]/[`Self::emit_relational`]: after the
    /// comparison's operands are popped, jump to a synthetic "true" arm on
    /// `jump_if_true`, otherwise fall into a synthetic "false" arm — the
    /// same shape `generate_if` uses for a value-producing branch, just
    /// with the two arms being `iconst_0`/`iconst_1` instead of user code.
    fn emit_boolean_from_jump(&mut self, jump_if_true: u8) {
        let frame_before = self.frame.clone();
        let jump_true = self.emit_branch_placeholder(jump_if_true);

        self.emit_simple(opcodes::ICONST_0);
        let jump_end = self.emit_branch_placeholder(opcodes::GOTO);

        let true_pc = self.pc();
        self.patch_jump(jump_true, true_pc);
        self.frame = frame_before;
        self.record_frame(true_pc);
        self.emit_simple(opcodes::ICONST_1);

        let end_pc = self.pc();
        self.patch_jump(jump_end, end_pc);
        self.record_frame(end_pc);
    }

    fn emit_equality(&mut self, ast: &Ast, expr: NodeId, op: TokenKind) {
        let node = ast.get(expr);
        let (lhs, rhs) = (node.lhs, node.rhs);
        let lhs_kind = self.expr_runtime_kind(ast, lhs);
        let rhs_kind = self.expr_runtime_kind(ast, rhs);

        match self.common_numeric_type(lhs_kind, rhs_kind) {
            Some(common) => {
                let common_ty = Self::to_type_id(common);
                self.emit_expr(ast, lhs);
                self.coerce(ast, lhs, common_ty);
                self.emit_expr(ast, rhs);
                self.coerce(ast, rhs, common_ty);
                self.emit_numeric_compare_and_branch(common, op)
            }
            None if lhs_kind == RuntimeKind::Int && rhs_kind == RuntimeKind::Int => {
                // Both boolean (or otherwise int-represented): compare directly.
                self.emit_expr(ast, lhs);
                self.emit_expr(ast, rhs);
                self.frame_pop_words(2);
                let opcode = if op == TokenKind::EqEq {
                    opcodes::IF_ICMPEQ
                } else {
                    opcodes::IF_ICMPNE
                };
                self.emit_boolean_from_jump(opcode);
            }
            None => {
                self.emit_expr(ast, lhs);
                self.emit_expr(ast, rhs);
                self.frame_pop_words(2);
                let opcode = if op == TokenKind::EqEq {
                    opcodes::IF_ACMPEQ
                } else {
                    opcodes::IF_ACMPNE
                };
                self.emit_boolean_from_jump(opcode);
            }
        }
    }

    fn emit_relational(&mut self, ast: &Ast, expr: NodeId, op: TokenKind) {
        let node = ast.get(expr);
        let (lhs, rhs) = (node.lhs, node.rhs);
        let lhs_kind = self.expr_runtime_kind(ast, lhs);
        let rhs_kind = self.expr_runtime_kind(ast, rhs);
        let common = self
            .common_numeric_type(lhs_kind, rhs_kind)
            .unwrap_or(RuntimeKind::Int);
        let common_ty = Self::to_type_id(common);

        self.emit_expr(ast, lhs);
        self.coerce(ast, lhs, common_ty);
        self.emit_expr(ast, rhs);
        self.coerce(ast, rhs, common_ty);
        self.emit_numeric_compare_and_branch(common, op);
    }

    /// Pops the two already-widened operands (still on the frame) and emits
    /// a comparison-to-boolean sequence: `Int` compares directly with
    /// `if_icmp<cond>`; wider numeric kinds reduce to a single `-1`/`0`/`1`
    /// via `lcmp`/`fcmpg`/`dcmpg` first, then compare that against zero.
    fn emit_numeric_compare_and_branch(&mut self, common: RuntimeKind, op: TokenKind) {
        match common {
            RuntimeKind::Int => {
                self.frame_pop_words(2);
                let opcode = match op {
                    TokenKind::EqEq => opcodes::IF_ICMPEQ,
                    TokenKind::BangEq => opcodes::IF_ICMPNE,
                    TokenKind::Lt => opcodes::IF_ICMPLT,
                    TokenKind::Le => opcodes::IF_ICMPLE,
                    TokenKind::Gt => opcodes::IF_ICMPGT,
                    TokenKind::Ge => opcodes::IF_ICMPGE,
                    _ => unreachable!(),
                };
                self.emit_boolean_from_jump(opcode);
            }
            _ => {
                let cmp_opcode = match common {
                    RuntimeKind::Long => opcodes::LCMP,
                    RuntimeKind::Float => opcodes::FCMPG,
                    RuntimeKind::Double => opcodes::DCMPG,
                    _ => unreachable!(),
                };
                self.emit_simple(cmp_opcode);
                self.frame_pop();
                let opcode = match op {
                    TokenKind::EqEq => opcodes::IFEQ,
                    TokenKind::BangEq => opcodes::IFNE,
                    TokenKind::Lt => opcodes::IFLT,
                    TokenKind::Le => opcodes::IFLE,
                    TokenKind::Gt => opcodes::IFGT,
                    TokenKind::Ge => opcodes::IFGE,
                    _ => unreachable!(),
                };
                self.emit_boolean_from_jump(opcode);
            }
        }
    }

    // -- calls ---------------------------------------------------------------

    fn emit_call(&mut self, ast: &Ast, expr: NodeId) {
        let node = ast.get(expr);
        let args = ast.call_args(node).to_vec();
        match *self.resolve.calls.get(&expr).expect("Call must have resolved") {
            ResolvedCall::Intrinsic(intrinsic) => self.emit_intrinsic_call(ast, intrinsic, &args),
            ResolvedCall::UserMethod(method_id) => self.emit_user_call(ast, method_id, &args),
        }
    }

    fn emit_intrinsic_call(&mut self, ast: &Ast, intrinsic: Intrinsic, args: &[NodeId]) {
        let field = self.pool.add_field_ref(
            "java/lang/System",
            "out",
            "Ljava/io/PrintStream;",
        );
        self.emit1(opcodes::GETSTATIC);
        self.emit_u2(field);
        self.frame_push(VerificationInfo::Object {
            class_index: self.pool.add_class("java/io/PrintStream"),
        });

        let arg_type = match intrinsic {
            Intrinsic::PrintlnUnit => None,
            Intrinsic::PrintlnBoolean => Some(TypeId::BOOLEAN),
            Intrinsic::PrintlnInt => Some(TypeId::INT),
            Intrinsic::PrintlnLong => Some(TypeId::LONG),
            Intrinsic::PrintlnDouble => Some(TypeId::DOUBLE),
            Intrinsic::PrintlnString => Some(TypeId::STRING),
        };
        if let (Some(target), Some(&arg)) = (arg_type, args.first()) {
            self.emit_expr(ast, arg);
            self.coerce(ast, arg, target);
        }

        let method = self.pool.add_method_ref(
            "java/io/PrintStream",
            "println",
            intrinsic.descriptor(),
        );
        self.emit1(opcodes::INVOKEVIRTUAL);
        self.emit_u2(method);
        // Pops the receiver plus the argument (if any); println always
        // returns void, so nothing is pushed back.
        self.frame_pop_words(if arg_type.is_some() {
            1 + word_count(runtime_kind(self.table, arg_type.unwrap()))
        } else {
            1
        });
    }

    fn emit_user_call(&mut self, ast: &Ast, method_id: TypeId, args: &[NodeId]) {
        let sig = match &self.table.get(method_id).kind {
            TypeKind::Method(sig) => sig.clone(),
            _ => unreachable!("resolved call must target a Method"),
        };

        if sig.flags.contains(crate::types::MethodFlags::INLINE_ONLY) {
            self.splice_inline_call(ast, &sig, args);
            return;
        }

        for (&arg, &param_type) in args.iter().zip(&sig.argument_types) {
            self.emit_expr(ast, arg);
            self.coerce(ast, arg, param_type);
        }

        let descriptor = descriptor::descriptor_of(self.table, method_id);
        let owner = self.table.get(sig.this_class_type).fqn();
        let method_ref = self.pool.add_method_ref(&owner, &sig.name, &descriptor);
        self.emit1(opcodes::INVOKESTATIC);
        self.emit_u2(method_ref);

        let arg_words: u16 = sig
            .argument_types
            .iter()
            .map(|&t| word_count(runtime_kind(self.table, t)))
            .sum();
        self.frame_pop_words(arg_words);
        if sig.return_type != TypeId::UNIT {
            self.frame_push(verification_info_of(self.table, self.pool, sig.return_type));
        }
    }

    /// Splices an `InlineOnly` callee's body directly into the caller:
    /// arguments are stored into fresh scratch locals, then the callee's
    /// code bytes are replayed opcode-by-opcode, remapping its local-slot
    /// references to the scratch locals and deep-importing any
    /// constant-pool index it touches via `ConstantPool::import_constant`.
    /// A trailing `xreturn` ends the splice with its value left on the
    /// stack rather than actually returning from the caller. This covers
    /// the small, branch-free wrapper bodies the in-scope standard library
    /// ships with `InlineOnly`; not every opcode a method body could
    /// contain is handled.
    fn splice_inline_call(&mut self, ast: &Ast, sig: &MethodSignature, args: &[NodeId]) {
        let inline = sig.inline.as_ref().expect("INLINE_ONLY method must carry an InlineBody");

        let mut slots = Vec::with_capacity(args.len());
        for (&arg, &param_type) in args.iter().zip(&sig.argument_types).rev() {
            self.emit_expr(ast, arg);
            self.coerce(ast, arg, param_type);
            let kind = local_kind_of(runtime_kind(self.table, param_type));
            let slot = self.scratch_base;
            self.scratch_base += word_count(runtime_kind(self.table, param_type));
            self.emit_store(kind, slot);
            slots.push((param_type, slot));
        }
        slots.reverse();

        let code = inline.code.clone();
        let mut ip = 0usize;
        while ip < code.len() {
            let opcode = code[ip];
            ip += 1;
            match opcode {
                opcodes::ILOAD | opcodes::LLOAD | opcodes::FLOAD | opcodes::DLOAD | opcodes::ALOAD => {
                    let orig_slot = code[ip];
                    ip += 1;
                    let (param_type, slot) = slots[orig_slot as usize];
                    self.emit_load(local_kind_of(runtime_kind(self.table, param_type)), slot);
                }
                opcodes::GETSTATIC
                | opcodes::PUTSTATIC
                | opcodes::GETFIELD
                | opcodes::PUTFIELD
                | opcodes::INVOKEVIRTUAL
                | opcodes::INVOKESPECIAL
                | opcodes::INVOKESTATIC
                | opcodes::NEW
                | opcodes::CHECKCAST
                | opcodes::LDC_W
                | opcodes::LDC2_W => {
                    let source_index = u16::from_be_bytes([code[ip], code[ip + 1]]);
                    ip += 2;
                    let new_index = self.pool.import_constant(&inline.imported_pool, source_index);
                    self.emit1(opcode);
                    self.emit_u2(new_index);
                    self.apply_inline_pool_effect(opcode, &inline.imported_pool, source_index);
                }
                opcodes::LDC => {
                    let source_index = code[ip] as u16;
                    ip += 1;
                    let new_index = self.pool.import_constant(&inline.imported_pool, source_index);
                    self.emit_ldc(new_index);
                    self.frame_push(VerificationInfo::Integer);
                }
                opcodes::IRETURN
                | opcodes::LRETURN
                | opcodes::FRETURN
                | opcodes::DRETURN
                | opcodes::ARETURN => break,
                opcodes::RETURN => break,
                _ => {
                    let len = opcodes::operand_len(opcode) as usize;
                    ip += len;
                    self.emit_simple(opcode);
                }
            }
        }
    }

    /// For the pool-indexed opcodes the inline interpreter supports,
    /// applies the stack effect that depends on the referenced entry's
    /// descriptor — invokes and field accesses read it off the *source*
    /// pool before import (the shape is identical either side).
    fn apply_inline_pool_effect(
        &mut self,
        opcode: u8,
        source_pool: &ConstantPool,
        source_index: crate::classfile::constant_pool::PoolIndex,
    ) {
        use crate::classfile::constant_pool::ConstantPoolEntry as E;
        match opcode {
            opcodes::NEW | opcodes::CHECKCAST => {
                let class_index = match source_pool.get(source_index) {
                    Some(E::Class { .. }) => source_index,
                    _ => source_index,
                };
                let _ = class_index;
                if opcode == opcodes::NEW {
                    self.frame_push(VerificationInfo::Object {
                        class_index: self.pool.add_class(
                            source_pool.class_name_at(source_index).unwrap_or("java/lang/Object"),
                        ),
                    });
                }
            }
            opcodes::GETSTATIC | opcodes::GETFIELD | opcodes::PUTSTATIC | opcodes::PUTFIELD => {
                let descriptor = field_descriptor(source_pool, source_index);
                let (words, info) = descriptor_word_and_info(self.table, self.pool, &descriptor);
                match opcode {
                    opcodes::GETFIELD => self.frame_pop(),
                    opcodes::PUTFIELD => {
                        self.frame_pop_words(words);
                        self.frame_pop()
                    }
                    opcodes::PUTSTATIC => {
                        self.frame_pop_words(words);
                        return;
                    }
                    _ => VerificationInfo::Top,
                };
                if matches!(opcode, opcodes::GETSTATIC | opcodes::GETFIELD) {
                    self.frame_push(info);
                }
            }
            opcodes::INVOKEVIRTUAL | opcodes::INVOKESPECIAL | opcodes::INVOKESTATIC => {
                let descriptor = method_descriptor(source_pool, source_index);
                let (arg_words, ret_words, ret_info) =
                    invoke_word_counts(self.table, self.pool, &descriptor);
                let receiver_words = if opcode == opcodes::INVOKESTATIC { 0 } else { 1 };
                self.frame_pop_words(arg_words + receiver_words);
                if ret_words > 0 {
                    self.frame_push(ret_info);
                }
            }
            opcodes::LDC2_W => {
                self.frame_push(match source_pool.get(source_index) {
                    Some(E::Long(_)) => VerificationInfo::Long,
                    Some(E::Double(_)) => VerificationInfo::Double,
                    _ => VerificationInfo::Top,
                });
            }
            opcodes::LDC_W => self.frame_push(VerificationInfo::Integer),
            _ => {}
        }
    }
}

/// `pushed_kind_for_opcode` maps an opcode that `simple_stack_effect`
/// reports as pushing exactly one logical value to that value's category.
fn pushed_kind_for_opcode(opcode: u8) -> VerificationInfo {
    use opcodes::*;
    match opcode {
        LCONST_0 | LCONST_1 | LADD | LSUB | LMUL | LDIV | LREM | LNEG | LAND | LOR | LXOR | I2L
        | F2L | D2L => VerificationInfo::Long,
        DCONST_0 | DCONST_1 | DADD | DSUB | DMUL | DDIV | DREM | DNEG | I2D | L2D | F2D => {
            VerificationInfo::Double
        }
        FCONST_0 | FCONST_1 | FCONST_2 | FADD | FSUB | FMUL | FDIV | FREM | FNEG | I2F | L2F
        | D2F => VerificationInfo::Float,
        _ => VerificationInfo::Integer,
    }
}

fn is_value_kind(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::IntegerLiteral
            | NodeKind::FloatLiteral
            | NodeKind::StringLiteral
            | NodeKind::BooleanLiteral
            | NodeKind::Identifier
            | NodeKind::UnaryOp
            | NodeKind::BinaryOp
            | NodeKind::LogicalAnd
            | NodeKind::LogicalOr
            | NodeKind::Call
            | NodeKind::Navigation
            | NodeKind::Grouping
            | NodeKind::If
    )
}

fn is_value_statement(ast: &Ast, stmt: NodeId) -> bool {
    is_value_kind(ast.get(stmt).kind)
}

fn field_descriptor(pool: &ConstantPool, field_ref_index: crate::classfile::constant_pool::PoolIndex) -> String {
    use crate::classfile::constant_pool::ConstantPoolEntry as E;
    match pool.get(field_ref_index) {
        Some(E::FieldRef { name_and_type_index, .. }) => match pool.get(*name_and_type_index) {
            Some(E::NameAndType { descriptor_index, .. }) => {
                pool.utf8_at(*descriptor_index).unwrap_or("I").to_string()
            }
            _ => "I".to_string(),
        },
        _ => "I".to_string(),
    }
}

fn method_descriptor(pool: &ConstantPool, method_ref_index: crate::classfile::constant_pool::PoolIndex) -> String {
    use crate::classfile::constant_pool::ConstantPoolEntry as E;
    match pool.get(method_ref_index) {
        Some(E::MethodRef { name_and_type_index, .. })
        | Some(E::InterfaceMethodRef { name_and_type_index, .. }) => match pool.get(*name_and_type_index) {
            Some(E::NameAndType { descriptor_index, .. }) => {
                pool.utf8_at(*descriptor_index).unwrap_or("()V").to_string()
            }
            _ => "()V".to_string(),
        },
        _ => "()V".to_string(),
    }
}

fn descriptor_word_and_info(
    table: &mut TypeTable,
    pool: &mut ConstantPool,
    descriptor: &str,
) -> (u16, VerificationInfo) {
    let (type_id, _) = descriptor::parse_field_descriptor(table, descriptor).unwrap_or((TypeId::INT, 1));
    (word_count(runtime_kind(table, type_id)), verification_info_of(table, pool, type_id))
}

fn invoke_word_counts(
    table: &mut TypeTable,
    pool: &mut ConstantPool,
    descriptor: &str,
) -> (u16, u16, VerificationInfo) {
    let (args, ret) = descriptor::parse_method_descriptor(table, descriptor).unwrap_or((vec![], TypeId::UNIT));
    let arg_words: u16 = args.iter().map(|&t| word_count(runtime_kind(table, t))).sum();
    if ret == TypeId::UNIT {
        (arg_words, 0, VerificationInfo::Top)
    } else {
        (arg_words, word_count(runtime_kind(table, ret)), verification_info_of(table, pool, ret))
    }
}

// -- stack map frame resolution ---------------------------------------------

/// Implements the "pick the smallest encoding" half of stack-map synthesis:
/// sorts the frames recorded during emission by `pc`, tombstones any later
/// duplicate at the same `pc`, computes each `offset_delta` relative to the
/// previous surviving frame (or the method's implicit initial frame for the
/// first one), and chooses `Same`/`SameLocals1StackItem`/`Chop`/
/// `SameExtended`/`Append`/`Full` — whichever is both valid and smallest.
fn resolve_stack_map_frames(
    initial_locals: &[VerificationInfo],
    mut pending: Vec<PendingFrame>,
) -> Vec<StackMapFrameEntry> {
    pending.sort_by_key(|f| f.pc);
    pending.dedup_by_key(|f| f.pc);

    let mut entries = Vec::with_capacity(pending.len());
    let mut prev_locals = initial_locals.to_vec();
    let mut prev_pc: Option<u32> = None;

    for frame in &pending {
        let offset_delta = match prev_pc {
            None => frame.pc,
            Some(prev) => frame.pc - prev - 1,
        } as u16;
        entries.push(choose_frame_entry(offset_delta, &prev_locals, &frame.locals, &frame.stack));
        prev_locals = frame.locals.clone();
        prev_pc = Some(frame.pc);
    }
    entries
}

fn choose_frame_entry(
    offset_delta: u16,
    prev_locals: &[VerificationInfo],
    locals: &[VerificationInfo],
    stack: &[VerificationInfo],
) -> StackMapFrameEntry {
    if stack.is_empty() && locals == prev_locals {
        return if offset_delta < 64 {
            StackMapFrameEntry::Same { offset_delta }
        } else {
            StackMapFrameEntry::SameExtended { offset_delta }
        };
    }
    if stack.len() == 1 && locals == prev_locals && offset_delta < 64 {
        return StackMapFrameEntry::SameLocals1StackItem {
            offset_delta,
            stack: stack[0].clone(),
        };
    }
    if stack.is_empty()
        && locals.len() > prev_locals.len()
        && locals.len() - prev_locals.len() <= 3
        && locals[..prev_locals.len()] == *prev_locals
    {
        return StackMapFrameEntry::Append {
            offset_delta,
            locals: locals[prev_locals.len()..].to_vec(),
        };
    }
    if stack.is_empty()
        && locals.len() < prev_locals.len()
        && prev_locals.len() - locals.len() <= 3
        && prev_locals[..locals.len()] == *locals
    {
        return StackMapFrameEntry::Chop {
            offset_delta,
            chop_count: (prev_locals.len() - locals.len()) as u8,
        };
    }
    StackMapFrameEntry::Full {
        offset_delta,
        locals: locals.to_vec(),
        stack: stack.to_vec(),
    }
}

// -- class-level assembly -----------------------------------------------------

fn synthesize_default_constructor(pool: &mut ConstantPool, super_internal_name: &str) -> MethodInfo {
    let name_index = pool.add_utf8("<init>");
    let descriptor_index = pool.add_utf8("()V");
    let super_ctor = pool.add_method_ref(super_internal_name, "<init>", "()V");
    let code = vec![
        opcodes::ALOAD_0,
        opcodes::INVOKESPECIAL,
        (super_ctor >> 8) as u8,
        (super_ctor & 0xff) as u8,
        opcodes::RETURN,
    ];
    MethodInfo {
        access_flags: MemberAccessFlags::PUBLIC,
        name_index,
        descriptor_index,
        attributes: vec![Attribute::Code(CodeAttribute {
            max_stack: 1,
            max_locals: 1,
            code,
            exception_table: vec![],
            attributes: vec![],
        })],
    }
}

fn synthesize_entry_point(pool: &mut ConstantPool, this_internal_name: &str) -> MethodInfo {
    let name_index = pool.add_utf8("main");
    let descriptor_index = pool.add_utf8("([Ljava/lang/String;)V");
    let user_main = pool.add_method_ref(this_internal_name, "main", "()V");
    let code = vec![
        opcodes::INVOKESTATIC,
        (user_main >> 8) as u8,
        (user_main & 0xff) as u8,
        opcodes::RETURN,
    ];
    MethodInfo {
        access_flags: MemberAccessFlags::PUBLIC | MemberAccessFlags::STATIC,
        name_index,
        descriptor_index,
        attributes: vec![Attribute::Code(CodeAttribute {
            max_stack: 0,
            max_locals: 1,
            code,
            exception_table: vec![],
            attributes: vec![],
        })],
    }
}

fn program_decls(ast: &Ast, root: NodeId) -> Vec<NodeId> {
    ast.statement_list(ast.get(root)).to_vec()
}

fn generate_method(
    source: &[u8],
    tokens: &[Token],
    table: &mut TypeTable,
    resolve: &ResolveResult,
    pool: &mut ConstantPool,
    this_internal_name: &str,
    decl: NodeId,
    sig: &MethodSignature,
    descriptor: &str,
    line_table: &LineTable,
    ast: &Ast,
) -> MethodInfo {
    let param_nodes = ast.fun_signature(ast.get(decl)).0.to_vec();

    let mut codegen = MethodCodeGen::new(source, tokens, table, resolve, pool, this_internal_name, sig.return_type);
    for &param in &param_nodes {
        let slot_info = *resolve.locals.get(&param).expect("param must have a resolved local slot");
        codegen.declare_param_or_local(slot_info.type_id);
    }

    let body = ast.get(decl).lhs;
    codegen.generate_body(ast, body);
    let result = codegen.finish();

    let name_index = pool.add_utf8(&sig.name);
    let descriptor_index = pool.add_utf8(descriptor);
    let (line, _) = line_table.line_col(tokens[ast.get(decl).main_token_i].source_offset);

    let mut code_attributes = Vec::new();
    if !result.stack_map.is_empty() {
        code_attributes.push(Attribute::StackMapTable(result.stack_map));
    }
    code_attributes.push(Attribute::LineNumberTable(vec![LineNumberEntry {
        start_pc: 0,
        line_number: (line + 1) as u16,
    }]));

    MethodInfo {
        access_flags: MemberAccessFlags::from_bits_truncate(sig.access_flags),
        name_index,
        descriptor_index,
        attributes: vec![Attribute::Code(CodeAttribute {
            max_stack: result.max_stack,
            max_locals: result.max_locals,
            code: result.code,
            exception_table: vec![],
            attributes: code_attributes,
        })],
    }
}

/// Generates a complete `.class` file for one compiled source file: a
/// synthetic no-arg constructor, every top-level `fun` as a `public static`
/// method, and — when the file declares a zero-argument `Unit`-returning
/// `main` — a JVM-visible `main(String[])` trampoline that calls it.
pub fn generate(
    ast: &Ast,
    root: NodeId,
    source: &[u8],
    tokens: &[Token],
    line_table: &LineTable,
    table: &mut TypeTable,
    resolve: &ResolveResult,
    this_internal_name: &str,
    source_file_name: &str,
) -> ClassFile {
    let mut class = ClassFile::new(this_internal_name, "java/lang/Object");
    let sourcefile_index = class.constant_pool.add_utf8(source_file_name);
    class.attributes.push(Attribute::SourceFile { sourcefile_index });
    class
        .methods
        .push(synthesize_default_constructor(&mut class.constant_pool, "java/lang/Object"));

    let mut has_entry_point = false;
    for decl in program_decls(ast, root) {
        if ast.get(decl).kind != NodeKind::FunDecl {
            continue;
        }
        let method_id = match resolve.functions.get(&decl) {
            Some(&id) => id,
            None => continue,
        };
        let sig = match &table.get(method_id).kind {
            TypeKind::Method(sig) => sig.clone(),
            _ => continue,
        };
        if sig.name == "main" && sig.argument_types.is_empty() && sig.return_type == TypeId::UNIT {
            has_entry_point = true;
        }
        let descriptor = descriptor::descriptor_of(table, method_id);
        let method_info = generate_method(
            source,
            tokens,
            table,
            resolve,
            &mut class.constant_pool,
            this_internal_name,
            decl,
            &sig,
            &descriptor,
            line_table,
            ast,
        );
        class.methods.push(method_info);
    }

    if has_entry_point {
        class
            .methods
            .push(synthesize_entry_point(&mut class.constant_pool, this_internal_name));
    }

    class
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ClassPath;
    use crate::lexer::lex;
    use crate::parser::parse;
    use crate::resolver::resolve;

    fn compile(src: &str) -> ClassFile {
        let lexed = lex(src.as_bytes());
        assert!(!lexed.diagnostics.has_errors());
        let mut parsed = parse(src.as_bytes(), &lexed.tokens);
        assert!(!parsed.diagnostics.has_errors());
        let mut table = TypeTable::new();
        let this_class = table.add_instance("HelloKt", String::new(), Some("java/lang/Object".to_string()));
        let mut class_path = ClassPath::new(vec![]);
        let result = resolve(
            &mut parsed.ast,
            src.as_bytes(),
            &lexed.tokens,
            &mut table,
            &mut class_path,
            this_class,
        );
        assert!(!result.diagnostics.has_errors(), "{:?}", result.diagnostics);
        generate(
            &parsed.ast,
            parsed.root,
            src.as_bytes(),
            &lexed.tokens,
            &lexed.line_table,
            &mut table,
            &result,
            "HelloKt",
            "hello.kt",
        )
    }

    #[test]
    fn hello_world_gets_entry_point_and_constructor() {
        let class = compile(r#"fun main() { println("hi") }"#);
        assert!(class.find_method("<init>", "()V").is_some());
        assert!(class.find_method("main", "()V").is_some());
        assert!(class.find_method("main", "([Ljava/lang/String;)V").is_some());
        let bytes = class.write();
        let read_back = ClassFile::read(&bytes).expect("generated class file must round-trip");
        assert_eq!(read_back.this_name(), "HelloKt");
    }

    #[test]
    fn empty_file_gets_only_the_synthetic_constructor() {
        let class = compile("");
        assert_eq!(class.methods.len(), 1);
        assert_eq!(class.methods[0].name(&class.constant_pool), "<init>");
    }

    #[test]
    fn arithmetic_widening_emits_conversion() {
        let class = compile("fun main() { var x: Long = 1 + 2L }");
        let main = class.find_method("main", "()V").unwrap();
        let code = &main.code().unwrap().code;
        assert!(code.contains(&opcodes::I2L));
        assert!(code.contains(&opcodes::LADD));
    }

    #[test]
    fn if_statement_without_else_round_trips() {
        let class = compile("fun main() { var x = 1 \n if (x == 1) { println(\"yes\") } }");
        let bytes = class.write();
        ClassFile::read(&bytes).expect("class with an if/no-else must round-trip");
    }

    #[test]
    fn if_expression_produces_a_value_on_both_branches() {
        let class = compile("fun f(b: Boolean): Int { return if (b) 1 else 2 }");
        let bytes = class.write();
        let read_back = ClassFile::read(&bytes).expect("if-expression class must round-trip");
        assert!(read_back.find_method("f", "(Z)I").is_some());
    }

    #[test]
    fn while_loop_jumps_backward_and_round_trips() {
        let class = compile("fun main() { var i = 0 \n while (i < 3) { i = i + 1 } }");
        let bytes = class.write();
        ClassFile::read(&bytes).expect("class with a while loop must round-trip");
    }

    #[test]
    fn short_circuit_and_round_trips() {
        let class = compile("fun f(a: Boolean, b: Boolean): Boolean { return a && b }");
        let bytes = class.write();
        ClassFile::read(&bytes).expect("short-circuit class must round-trip");
    }

    #[test]
    fn user_function_call_emits_invokestatic() {
        let class = compile("fun add(a: Int, b: Int): Int { return a + b } \n fun main() { println(add(1, 2)) }");
        let main = class.find_method("main", "()V").unwrap();
        let code = &main.code().unwrap().code;
        assert!(code.contains(&opcodes::INVOKESTATIC));
    }
}
