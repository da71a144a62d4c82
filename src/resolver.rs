//! Name resolution, scoping, overload resolution, and bottom-up type
//! checking.
//!
//! Top-level functions are resolved in two passes so forward and mutually
//! recursive calls work: the first pass registers every `FunDecl`'s
//! signature (so any call site can find it regardless of declaration
//! order), the second walks each body and type-checks it against the
//! table the first pass built.
//!
//! Local scoping is a flat `Vec<LocalVar>` with scope markers rather than a
//! stack of maps: a marker records how many locals existed when a scope was
//! entered, and exiting the scope truncates back to it. A variable is only
//! visible to code that runs after its declaration in the same pass over
//! the statement list, so "used before its declaration" falls out of the
//! walk order rather than needing a separate initialized-bit per local.

use crate::ast::{Ast, ExtraData, Node, NodeFlags, NodeId, NodeKind};
use crate::archive::ClassPath;
use crate::diagnostics::{Diagnostic, DiagnosticBag, Span};
use crate::lexer::{Token, TokenKind, lexeme};
use crate::types::{IntegerKinds, MethodFlags, MethodSignature, Type, TypeId, TypeKind, TypeTable};
use std::collections::HashMap;

/// `kotlin.io`'s top-level `println`/`print`, the only intrinsic this
/// compiler recognizes by name rather than through the class-path
/// (archive-backed resolution is the general path;
/// `println` is the one entry point a hello-world program needs before any
/// class-path lookup machinery is exercised).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    PrintlnUnit,
    PrintlnBoolean,
    PrintlnInt,
    PrintlnLong,
    PrintlnDouble,
    PrintlnString,
}

impl Intrinsic {
    pub fn descriptor(self) -> &'static str {
        match self {
            Intrinsic::PrintlnUnit => "()V",
            Intrinsic::PrintlnBoolean => "(Z)V",
            Intrinsic::PrintlnInt => "(I)V",
            Intrinsic::PrintlnLong => "(J)V",
            Intrinsic::PrintlnDouble => "(D)V",
            Intrinsic::PrintlnString => "(Ljava/lang/String;)V",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LocalSlot {
    pub slot: u16,
    pub type_id: TypeId,
}

#[derive(Debug, Clone, Copy)]
pub enum ResolvedCall {
    UserMethod(TypeId),
    Intrinsic(Intrinsic),
}

#[derive(Debug, Default)]
pub struct ResolveResult {
    pub diagnostics: DiagnosticBag,
    /// `FunDecl` node -> the `Method` `TypeId` registered for it.
    pub functions: HashMap<NodeId, TypeId>,
    /// `Param`/`VarDecl` declaration sites and `Identifier` use sites that
    /// refer to a local -> that local's slot and type.
    pub locals: HashMap<NodeId, LocalSlot>,
    /// `Call` node -> what it resolved to.
    pub calls: HashMap<NodeId, ResolvedCall>,
    /// `FunDecl` node -> the `max_locals` its body required.
    pub max_locals: HashMap<NodeId, u16>,
}

struct LocalVar {
    name: String,
    type_id: TypeId,
    is_val: bool,
    slot: u16,
}

struct FunctionScope {
    locals: Vec<LocalVar>,
    scope_marks: Vec<usize>,
    next_slot: u16,
    return_type: TypeId,
}

impl FunctionScope {
    fn new(return_type: TypeId) -> Self {
        FunctionScope {
            locals: Vec::new(),
            scope_marks: Vec::new(),
            next_slot: 0,
            return_type,
        }
    }

    fn enter_scope(&mut self) {
        self.scope_marks.push(self.locals.len());
    }

    fn exit_scope(&mut self) {
        if let Some(mark) = self.scope_marks.pop() {
            self.locals.truncate(mark);
        }
    }

    fn declare(&mut self, name: String, type_id: TypeId, is_val: bool, table: &TypeTable) -> u16 {
        let slot = self.next_slot;
        self.next_slot += word_count(table, type_id);
        self.locals.push(LocalVar {
            name,
            type_id,
            is_val,
            slot,
        });
        slot
    }

    fn lookup(&self, name: &str) -> Option<&LocalVar> {
        self.locals.iter().rev().find(|l| l.name == name)
    }
}

fn word_count(table: &TypeTable, type_id: TypeId) -> u16 {
    matches!(table.get(type_id).kind, TypeKind::Long | TypeKind::Double) as u16 + 1
}

pub struct Resolver<'a> {
    source: &'a [u8],
    tokens: &'a [Token],
    table: &'a mut TypeTable,
    class_path: &'a mut ClassPath,
    this_class: TypeId,
    diagnostics: DiagnosticBag,
    functions: HashMap<NodeId, TypeId>,
    locals: HashMap<NodeId, LocalSlot>,
    calls: HashMap<NodeId, ResolvedCall>,
    max_locals: HashMap<NodeId, u16>,
    /// Name of the `var`/`val` currently being initialized, if any: lets the
    /// `Identifier` case in [`Resolver::resolve_expr`] tell "reads its own
    /// not-yet-declared name" apart from an ordinary unresolved reference.
    declaring_name: Option<String>,
}

pub fn resolve(
    ast: &mut Ast,
    source: &[u8],
    tokens: &[Token],
    table: &mut TypeTable,
    class_path: &mut ClassPath,
    this_class: TypeId,
) -> ResolveResult {
    let mut resolver = Resolver {
        source,
        tokens,
        table,
        class_path,
        this_class,
        diagnostics: DiagnosticBag::new(),
        functions: HashMap::new(),
        locals: HashMap::new(),
        calls: HashMap::new(),
        max_locals: HashMap::new(),
        declaring_name: None,
    };
    resolver.run(ast);
    ResolveResult {
        diagnostics: resolver.diagnostics,
        functions: resolver.functions,
        locals: resolver.locals,
        calls: resolver.calls,
        max_locals: resolver.max_locals,
    }
}

impl<'a> Resolver<'a> {
    fn token_text(&self, token_i: crate::lexer::TokenIndex) -> &str {
        lexeme(self.source, &self.tokens[token_i])
    }

    fn span_of(&self, ast: &Ast, id: NodeId) -> Span {
        let node = ast.get(id);
        let token = &self.tokens[node.main_token_i];
        let len = crate::lexer::token_len(token.kind, self.source, token.source_offset).max(1);
        Span::new(token.source_offset, token.source_offset + len)
    }

    fn error(&mut self, ast: &Ast, id: NodeId, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(message, self.span_of(ast, id)));
    }

    /// Resolve a type annotation's token text to a [`TypeId`]: the eleven
    /// primitives by name, or a class-path lookup treating the name as
    /// already-qualified (there is no import system, so user-written type
    /// names are either primitives or fully written out).
    fn resolve_type_name(&mut self, name: &str) -> Option<TypeId> {
        Some(match name {
            "Any" => TypeId::ANY,
            "Unit" => TypeId::UNIT,
            "Boolean" => TypeId::BOOLEAN,
            "Byte" => TypeId::BYTE,
            "Char" => TypeId::CHAR,
            "Short" => TypeId::SHORT,
            "Int" => TypeId::INT,
            "Float" => TypeId::FLOAT,
            "Long" => TypeId::LONG,
            "Double" => TypeId::DOUBLE,
            "String" => TypeId::STRING,
            other => match self.class_path.resolve(self.table, other) {
                Ok(Some(id)) => id,
                Ok(None) => return None,
                Err(_) => return None,
            },
        })
    }

    fn run(&mut self, ast: &mut Ast) {
        let program = ast.get(ast_root(ast)).clone_node();
        let decls = ast.statement_list(&program).to_vec();

        // Pass 1: register every function signature.
        for &decl in &decls {
            if ast.get(decl).kind == NodeKind::FunDecl {
                self.register_function_signature(ast, decl);
            }
        }

        // Pass 2: type-check every body.
        for &decl in &decls {
            if ast.get(decl).kind == NodeKind::FunDecl {
                self.resolve_function_body(ast, decl);
            }
        }
    }

    fn register_function_signature(&mut self, ast: &Ast, decl: NodeId) {
        let node = ast.get(decl);
        let (param_nodes, return_type_token) = ast.fun_signature(node);
        let param_nodes = param_nodes.to_vec();
        let name = self.token_text(node.main_token_i).to_string();

        let mut argument_types = Vec::with_capacity(param_nodes.len());
        for &param in &param_nodes {
            let param_node = ast.get(param);
            let type_token = ast.type_annotation(param_node);
            let type_name = type_token.map(|t| self.token_text(t).to_string());
            let type_id = match type_name.as_deref().and_then(|n| self.resolve_type_name(n)) {
                Some(id) => id,
                None => {
                    self.error(ast, param, format!(
                        "unknown parameter type `{}`",
                        type_name.as_deref().unwrap_or("<missing>")
                    ));
                    TypeId::ANY
                }
            };
            argument_types.push(type_id);
        }

        let return_type = match return_type_token {
            Some(t) => {
                let name = self.token_text(t).to_string();
                self.resolve_type_name(&name).unwrap_or_else(|| {
                    self.error(ast, decl, format!("unknown return type `{name}`"));
                    TypeId::ANY
                })
            }
            None => TypeId::UNIT,
        };

        let signature = MethodSignature {
            name: name.clone(),
            source_file_name: String::new(),
            source_line: 0,
            argument_types,
            return_type,
            access_flags: 0x0001 | 0x0008, // ACC_PUBLIC | ACC_STATIC
            this_class_type: self.this_class,
            flags: MethodFlags::STATIC,
            inline: None,
        };
        let method_id = self.table.add(format!("{name}@{decl:?}"), TypeKind::Method(signature));
        self.table.add_method(self.this_class, method_id);
        self.functions.insert(decl, method_id);
    }

    fn resolve_function_body(&mut self, ast: &mut Ast, decl: NodeId) {
        let method_id = match self.functions.get(&decl) {
            Some(&id) => id,
            None => return,
        };
        let (return_type, param_nodes) = match &self.table.get(method_id).kind {
            TypeKind::Method(sig) => (sig.return_type, sig.argument_types.clone()),
            _ => unreachable!("function signature registered as non-Method kind"),
        };
        let body = ast.get(decl).lhs;
        let params = ast.fun_signature(ast.get(decl)).0.to_vec();

        let mut scope = FunctionScope::new(return_type);
        scope.enter_scope();
        for (param, type_id) in params.iter().zip(param_nodes) {
            let name = self.token_text(ast.get(*param).main_token_i).to_string();
            let slot = scope.declare(name, type_id, true, self.table);
            self.locals.insert(*param, LocalSlot { slot, type_id });
        }

        self.resolve_block(ast, body, &mut scope);
        scope.exit_scope();
        self.max_locals.insert(decl, scope.next_slot);
    }

    fn resolve_block(&mut self, ast: &mut Ast, block: NodeId, scope: &mut FunctionScope) {
        scope.enter_scope();
        let stmts = ast.statement_list(ast.get(block)).to_vec();
        for stmt in stmts {
            self.resolve_statement(ast, stmt, scope);
        }
        scope.exit_scope();
    }

    fn resolve_statement(&mut self, ast: &mut Ast, stmt: NodeId, scope: &mut FunctionScope) {
        match ast.get(stmt).kind {
            NodeKind::VarDecl => {
                let node = ast.get(stmt).clone_node();
                let declaring_name = self.token_text(node.main_token_i).to_string();
                let previous = self.declaring_name.replace(declaring_name);
                let init_type = self.resolve_expr(ast, node.lhs, scope);
                self.declaring_name = previous;
                let type_token = ast.type_annotation(&node);
                let declared_type = match type_token {
                    Some(t) => {
                        let name = self.token_text(t).to_string();
                        let annotated = self.resolve_type_name(&name).unwrap_or_else(|| {
                            self.error(ast, stmt, format!("unknown type `{name}`"));
                            TypeId::ANY
                        });
                        if !self.table.is_subtype(init_type, annotated) {
                            self.error(
                                ast,
                                stmt,
                                "initializer type does not match the declared type",
                            );
                        }
                        annotated
                    }
                    None => concretize_literal(self.table, init_type),
                };
                let name = self.token_text(node.main_token_i).to_string();
                let is_val = node.flags.contains(NodeFlags::IS_VAL);
                let slot = scope.declare(name, declared_type, is_val, self.table);
                self.locals.insert(stmt, LocalSlot { slot, type_id: declared_type });
                ast.set_type(stmt, declared_type);
            }
            NodeKind::If => {
                let node = ast.get(stmt).clone_node();
                let cond_type = self.resolve_expr(ast, node.lhs, scope);
                if cond_type != TypeId::BOOLEAN {
                    self.error(ast, node.lhs, "'if' condition must be Boolean");
                }
                self.resolve_nested_statement(ast, node.rhs, scope);
                let else_list = ast.statement_list(&node).to_vec();
                if let Some(&else_branch) = else_list.first() {
                    self.resolve_nested_statement(ast, else_branch, scope);
                }
            }
            NodeKind::While => {
                let node = ast.get(stmt).clone_node();
                let cond_type = self.resolve_expr(ast, node.lhs, scope);
                if cond_type != TypeId::BOOLEAN {
                    self.error(ast, node.lhs, "'while' condition must be Boolean");
                }
                self.resolve_nested_statement(ast, node.rhs, scope);
            }
            NodeKind::Return => {
                let node = ast.get(stmt).clone_node();
                let actual = if node.lhs == NodeId::NONE {
                    TypeId::UNIT
                } else {
                    self.resolve_expr(ast, node.lhs, scope)
                };
                if !self.table.is_subtype(actual, scope.return_type) {
                    self.error(ast, stmt, "returned type does not match the function's return type");
                }
            }
            NodeKind::Assign => {
                let node = ast.get(stmt).clone_node();
                let rhs_type = self.resolve_expr(ast, node.rhs, scope);
                let name = self.token_text(ast.get(node.lhs).main_token_i).to_string();
                match scope.lookup(&name) {
                    Some(local) => {
                        if local.is_val {
                            self.error(ast, stmt, format!("val '{name}' cannot be reassigned"));
                        } else if !self.table.is_subtype(rhs_type, local.type_id) {
                            self.error(ast, stmt, "assigned value's type does not match the variable's type");
                        }
                        let slot = local.slot;
                        let type_id = local.type_id;
                        self.locals.insert(node.lhs, LocalSlot { slot, type_id });
                    }
                    None => self.error(ast, node.lhs, format!("unresolved reference: {name}")),
                }
            }
            NodeKind::Block => self.resolve_block(ast, stmt, scope),
            _ => {
                self.resolve_expr(ast, stmt, scope);
            }
        }
    }

    fn resolve_nested_statement(&mut self, ast: &mut Ast, stmt: NodeId, scope: &mut FunctionScope) {
        if ast.get(stmt).kind == NodeKind::Block {
            self.resolve_block(ast, stmt, scope);
        } else {
            scope.enter_scope();
            self.resolve_statement(ast, stmt, scope);
            scope.exit_scope();
        }
    }

    fn resolve_expr(&mut self, ast: &mut Ast, expr: NodeId, scope: &mut FunctionScope) -> TypeId {
        let kind = ast.get(expr).kind;
        let type_id = match kind {
            NodeKind::IntegerLiteral => self.resolve_integer_literal(ast, expr),
            NodeKind::FloatLiteral => TypeId::DOUBLE,
            NodeKind::StringLiteral => TypeId::STRING,
            NodeKind::BooleanLiteral => TypeId::BOOLEAN,
            NodeKind::Identifier => {
                let name = self.token_text(ast.get(expr).main_token_i).to_string();
                match scope.lookup(&name) {
                    Some(local) => {
                        let slot = local.slot;
                        let type_id = local.type_id;
                        self.locals.insert(expr, LocalSlot { slot, type_id });
                        type_id
                    }
                    None => {
                        if self.declaring_name.as_deref() == Some(name.as_str()) {
                            self.error(
                                ast,
                                expr,
                                format!("cannot read local variable '{name}' in its own initializer"),
                            );
                        } else {
                            self.error(ast, expr, format!("unresolved reference: {name}"));
                        }
                        TypeId::ANY
                    }
                }
            }
            NodeKind::Grouping => {
                let lhs = ast.get(expr).lhs;
                self.resolve_expr(ast, lhs, scope)
            }
            NodeKind::UnaryOp => self.resolve_unary(ast, expr, scope),
            NodeKind::BinaryOp => self.resolve_binary(ast, expr, scope),
            NodeKind::LogicalAnd | NodeKind::LogicalOr => {
                let node = ast.get(expr).clone_node();
                let lhs = self.resolve_expr(ast, node.lhs, scope);
                let rhs = self.resolve_expr(ast, node.rhs, scope);
                if lhs != TypeId::BOOLEAN || rhs != TypeId::BOOLEAN {
                    self.error(ast, expr, "both operands of a logical operator must be Boolean");
                }
                TypeId::BOOLEAN
            }
            NodeKind::Call => self.resolve_call(ast, expr, scope),
            NodeKind::Navigation => {
                self.error(ast, expr, "member navigation is not yet supported");
                TypeId::ANY
            }
            NodeKind::If => self.resolve_if_expr(ast, expr, scope),
            NodeKind::Error => TypeId::ANY,
            _ => TypeId::ANY,
        };
        ast.set_type(expr, type_id);
        type_id
    }

    /// `if` used in expression position requires an `else` branch and a
    /// common type between the two branch values — unlike the statement
    /// form, which only needs a Boolean condition.
    fn resolve_if_expr(&mut self, ast: &mut Ast, expr: NodeId, scope: &mut FunctionScope) -> TypeId {
        let node = ast.get(expr).clone_node();
        let cond_type = self.resolve_expr(ast, node.lhs, scope);
        if cond_type != TypeId::BOOLEAN {
            self.error(ast, node.lhs, "'if' condition must be Boolean");
        }
        let else_list = ast.statement_list(&node).to_vec();
        let else_branch = match else_list.first() {
            Some(&id) => id,
            None => {
                self.error(ast, expr, "'if' must have an 'else' branch when used as an expression");
                self.resolve_branch_value(ast, node.rhs, scope);
                return TypeId::ANY;
            }
        };
        let then_type = self.resolve_branch_value(ast, node.rhs, scope);
        let else_type = self.resolve_branch_value(ast, else_branch, scope);
        if self.table.is_subtype(then_type, else_type) {
            concretize_literal(self.table, else_type)
        } else if self.table.is_subtype(else_type, then_type) {
            concretize_literal(self.table, then_type)
        } else {
            let then_name = self.table.get(then_type).this_class_name.clone();
            let else_name = self.table.get(else_type).this_class_name.clone();
            self.error(ast, expr, format!("incompatible types: {then_name} vs {else_name}"));
            TypeId::ANY
        }
    }

    /// The value an `if` branch contributes when `if` is used as an
    /// expression: a block's value is its last statement's type if that
    /// statement is itself an expression, `Unit` otherwise; a bare statement
    /// branch is an expression's type directly, or `Unit` for anything else
    /// (a `var`/`val`, `return`, etc. still gets resolved for diagnostics).
    fn resolve_branch_value(&mut self, ast: &mut Ast, branch: NodeId, scope: &mut FunctionScope) -> TypeId {
        match ast.get(branch).kind {
            NodeKind::Block => {
                scope.enter_scope();
                let stmts = ast.statement_list(ast.get(branch)).to_vec();
                let mut value_type = TypeId::UNIT;
                for (i, &stmt) in stmts.iter().enumerate() {
                    if i + 1 == stmts.len() && is_expr_kind(ast.get(stmt).kind) {
                        value_type = self.resolve_expr(ast, stmt, scope);
                    } else {
                        self.resolve_statement(ast, stmt, scope);
                    }
                }
                scope.exit_scope();
                value_type
            }
            kind if is_expr_kind(kind) => self.resolve_expr(ast, branch, scope),
            _ => {
                self.resolve_statement(ast, branch, scope);
                TypeId::UNIT
            }
        }
    }

    fn resolve_integer_literal(&mut self, ast: &Ast, expr: NodeId) -> TypeId {
        let text = self.token_text(ast.get(expr).main_token_i);
        let is_long = text.ends_with(['L', 'l']);
        let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
        let value: u64 = match digits.parse() {
            Ok(v) => v,
            Err(_) => {
                self.error(ast, expr, "integer literal too big");
                return TypeId::LONG;
            }
        };
        // No integer kind this compiler emits holds more than a signed
        // 64-bit range, even though the digits parsed as a `u64`: a literal
        // in `i64::MAX+1 ..= u64::MAX` (e.g. `2^63`) still overflows.
        if value > i64::MAX as u64 {
            self.error(ast, expr, "integer literal too big");
            return TypeId::LONG;
        }
        if is_long {
            return TypeId::LONG;
        }
        let possible = if value <= i8::MAX as u64 {
            IntegerKinds::BYTE | IntegerKinds::SHORT | IntegerKinds::INT | IntegerKinds::LONG
        } else if value <= i16::MAX as u64 {
            IntegerKinds::SHORT | IntegerKinds::INT | IntegerKinds::LONG
        } else if value <= i32::MAX as u64 {
            IntegerKinds::INT | IntegerKinds::LONG
        } else {
            IntegerKinds::LONG
        };
        self.table.add("<int-literal>".to_string(), TypeKind::IntegerLiteral { possible })
    }

    fn resolve_unary(&mut self, ast: &mut Ast, expr: NodeId, scope: &mut FunctionScope) -> TypeId {
        let node = ast.get(expr).clone_node();
        let operand_type = self.resolve_expr(ast, node.lhs, scope);
        let op = self.tokens[node.main_token_i].kind;
        match op {
            TokenKind::Bang => {
                if operand_type != TypeId::BOOLEAN {
                    self.error(ast, expr, "'!' requires a Boolean operand");
                }
                TypeId::BOOLEAN
            }
            TokenKind::Minus => {
                if !self.table.get(operand_type).is_integer()
                    && operand_type != TypeId::FLOAT
                    && operand_type != TypeId::DOUBLE
                {
                    self.error(ast, expr, "unary '-' requires a numeric operand");
                }
                concretize_literal(self.table, operand_type)
            }
            _ => unreachable!("UnaryOp main_token_i must be '-' or '!'"),
        }
    }

    fn resolve_binary(&mut self, ast: &mut Ast, expr: NodeId, scope: &mut FunctionScope) -> TypeId {
        let node = ast.get(expr).clone_node();
        let lhs = self.resolve_expr(ast, node.lhs, scope);
        let rhs = self.resolve_expr(ast, node.rhs, scope);
        let op = self.tokens[node.main_token_i].kind;
        match op {
            TokenKind::EqEq | TokenKind::BangEq => TypeId::BOOLEAN,
            TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => {
                if !self.is_numeric(lhs) || !self.is_numeric(rhs) {
                    self.error(ast, expr, "comparison requires numeric operands");
                }
                TypeId::BOOLEAN
            }
            TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::Percent => {
                if !self.is_numeric(lhs) || !self.is_numeric(rhs) {
                    self.error(ast, expr, "arithmetic requires numeric operands");
                    return TypeId::ANY;
                }
                self.widen(lhs, rhs)
            }
            _ => unreachable!("BinaryOp main_token_i must be a binary operator"),
        }
    }

    fn is_numeric(&self, id: TypeId) -> bool {
        let ty = self.table.get(id);
        ty.is_integer() || id == TypeId::FLOAT || id == TypeId::DOUBLE
    }

    /// The wider of two numeric operand types: `Double` > `Float` > `Long` >
    /// `Int` > `Short` > `Byte`, with `IntegerLiteral` concretized first.
    fn widen(&mut self, a: TypeId, b: TypeId) -> TypeId {
        let a = concretize_literal(self.table, a);
        let b = concretize_literal(self.table, b);
        let rank = |t: TypeId| -> u8 {
            match t {
                TypeId::DOUBLE => 5,
                TypeId::FLOAT => 4,
                TypeId::LONG => 3,
                TypeId::INT => 2,
                TypeId::SHORT => 1,
                _ => 0,
            }
        };
        if rank(a) >= rank(b) { a } else { b }
    }

    fn resolve_call(&mut self, ast: &mut Ast, expr: NodeId, scope: &mut FunctionScope) -> TypeId {
        let node = ast.get(expr).clone_node();
        let args = ast.call_args(&node).to_vec();
        let mut arg_types = Vec::with_capacity(args.len());
        for &arg in &args {
            arg_types.push(self.resolve_expr(ast, arg, scope));
        }

        let callee = node.lhs;
        if ast.get(callee).kind != NodeKind::Identifier {
            self.error(ast, expr, "member navigation is not yet supported");
            return TypeId::ANY;
        }
        let name = self.token_text(ast.get(callee).main_token_i).to_string();

        if name == "println" || name == "print" {
            if let Some(intrinsic) = self.resolve_println(&arg_types) {
                self.calls.insert(expr, ResolvedCall::Intrinsic(intrinsic));
                return TypeId::UNIT;
            }
            self.error(ast, expr, format!("no overload of '{name}' matches the given arguments"));
            return TypeId::UNIT;
        }

        match self.resolve_overload(self.this_class, &name, &arg_types) {
            Ok(Some(method_id)) => {
                self.calls.insert(expr, ResolvedCall::UserMethod(method_id));
                match &self.table.get(method_id).kind {
                    TypeKind::Method(sig) | TypeKind::Constructor(sig) => sig.return_type,
                    _ => TypeId::ANY,
                }
            }
            Ok(None) => {
                self.error(ast, expr, format!("unresolved reference: {name}"));
                TypeId::ANY
            }
            Err(message) => {
                self.error(ast, expr, message);
                TypeId::ANY
            }
        }
    }

    fn resolve_println(&self, arg_types: &[TypeId]) -> Option<Intrinsic> {
        match arg_types {
            [] => Some(Intrinsic::PrintlnUnit),
            [t] if *t == TypeId::STRING => Some(Intrinsic::PrintlnString),
            [t] if *t == TypeId::BOOLEAN => Some(Intrinsic::PrintlnBoolean),
            [t] if *t == TypeId::LONG => Some(Intrinsic::PrintlnLong),
            [t] if *t == TypeId::DOUBLE || *t == TypeId::FLOAT => Some(Intrinsic::PrintlnDouble),
            [t] if self.table.get(*t).is_integer() => Some(Intrinsic::PrintlnInt),
            _ => None,
        }
    }

    /// Most-specific-candidate overload resolution:
    /// filter by arity and per-argument subtyping, then eliminate any
    /// candidate dominated by a strictly more specific one. More than one
    /// survivor is an ambiguity diagnostic rather than a panic.
    fn resolve_overload(
        &self,
        owner: TypeId,
        name: &str,
        arg_types: &[TypeId],
    ) -> Result<Option<TypeId>, String> {
        let candidates: Vec<TypeId> = self
            .table
            .methods_of(owner)
            .iter()
            .copied()
            .filter(|&id| method_matches(self.table, id, name, arg_types))
            .collect();

        if candidates.is_empty() {
            return Ok(None);
        }
        if candidates.len() == 1 {
            return Ok(Some(candidates[0]));
        }

        let mut most_specific = candidates.clone();
        most_specific.retain(|&candidate| {
            !candidates.iter().any(|&other| {
                other != candidate && dominates(self.table, other, candidate)
            })
        });

        match most_specific.len() {
            1 => Ok(Some(most_specific[0])),
            _ => {
                let candidate_names: Vec<String> = most_specific
                    .iter()
                    .map(|&id| signature_label(self.table, id))
                    .collect();
                Err(format!(
                    "ambiguous call to {name}: candidates {} are equally specific",
                    candidate_names.join(", ")
                ))
            }
        }
    }
}

fn method_matches(table: &TypeTable, method_id: TypeId, name: &str, arg_types: &[TypeId]) -> bool {
    let sig = match &table.get(method_id).kind {
        TypeKind::Method(sig) | TypeKind::Constructor(sig) => sig,
        _ => return false,
    };
    if sig.name != name || sig.argument_types.len() != arg_types.len() {
        return false;
    }
    sig.argument_types
        .iter()
        .zip(arg_types)
        .all(|(&param, &arg)| table.is_subtype(arg, param))
}

/// Does `a`'s parameter list make it strictly more specific than `b`'s (every
/// parameter of `a` a subtype of the corresponding parameter of `b`)?
fn dominates(table: &TypeTable, a: TypeId, b: TypeId) -> bool {
    let (sig_a, sig_b) = match (&table.get(a).kind, &table.get(b).kind) {
        (TypeKind::Method(x) | TypeKind::Constructor(x), TypeKind::Method(y) | TypeKind::Constructor(y)) => {
            (x, y)
        }
        _ => return false,
    };
    sig_a
        .argument_types
        .iter()
        .zip(&sig_b.argument_types)
        .all(|(&x, &y)| table.is_subtype(x, y))
}

fn signature_label(table: &TypeTable, method_id: TypeId) -> String {
    match &table.get(method_id).kind {
        TypeKind::Method(sig) | TypeKind::Constructor(sig) => {
            let params: Vec<String> = sig
                .argument_types
                .iter()
                .map(|&t| table.get(t).this_class_name.clone())
                .collect();
            format!("{}({})", sig.name, params.join(", "))
        }
        _ => "<unknown>".to_string(),
    }
}

/// An unconstrained `IntegerLiteral` defaults to `Int` once it reaches a
/// position with no explicit annotation to pin it down.
/// Already-concrete types pass through unchanged.
fn concretize_literal(table: &mut TypeTable, type_id: TypeId) -> TypeId {
    match &table.get(type_id).kind {
        TypeKind::IntegerLiteral { .. } => TypeId::INT,
        _ => type_id,
    }
}

/// Node kinds that `resolve_expr` can assign a type to — used to decide
/// whether the last statement of an `if`-expression branch contributes a
/// value or the branch falls back to `Unit`.
fn is_expr_kind(kind: NodeKind) -> bool {
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

fn ast_root(ast: &Ast) -> NodeId {
    // `Ast::new` guarantees node 1 is the first real node pushed, which is
    // always the `Program` node produced by `parse_program`.
    NodeId(1)
}

trait CloneNode {
    fn clone_node(&self) -> Node;
}

impl CloneNode for Node {
    fn clone_node(&self) -> Node {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn resolve_source(src: &str) -> (ResolveResult, TypeTable) {
        let lexed = lex(src.as_bytes());
        let mut parsed = parse(src.as_bytes(), &lexed.tokens);
        let mut table = TypeTable::new();
        let this_class = table.add_instance("HelloKt", String::new(), Some("java/lang/Object".to_string()));
        let mut class_path = ClassPath::new(vec![]);
        let result = resolve(&mut parsed.ast, src.as_bytes(), &lexed.tokens, &mut table, &mut class_path, this_class);
        (result, table)
    }

    #[test]
    fn resolves_hello_world_println() {
        let (result, _table) = resolve_source(r#"fun main() { println("hi") }"#);
        assert!(!result.diagnostics.has_errors());
        assert_eq!(result.calls.len(), 1);
    }

    #[test]
    fn arithmetic_widens_int_and_long() {
        let (result, _table) = resolve_source("fun main() { var x: Long = 1 + 2L }");
        assert!(!result.diagnostics.has_errors());
    }

    #[test]
    fn integer_literal_at_i64_max_is_long() {
        let (result, _table) = resolve_source("fun main() { var x: Long = 9223372036854775807 }");
        assert!(!result.diagnostics.has_errors());
    }

    #[test]
    fn integer_literal_one_past_i64_max_overflows() {
        let (result, _table) = resolve_source("fun main() { var x = 9223372036854775808 }");
        assert!(result.diagnostics.has_errors());
    }

    #[test]
    fn use_before_declaration_is_unresolved() {
        let (result, _table) = resolve_source("fun main() { var y = x \n var x = 1 }");
        assert!(result.diagnostics.has_errors());
    }

    #[test]
    fn reading_variable_in_its_own_initializer_is_an_error() {
        let (result, _table) = resolve_source("fun k() { var x: Int = x }");
        assert!(result.diagnostics.has_errors());
    }

    #[test]
    fn val_reassignment_is_an_error() {
        let (result, _table) = resolve_source("fun main() { val x = 1 \n x = 2 }");
        assert!(result.diagnostics.has_errors());
    }

    #[test]
    fn if_expression_branch_type_mismatch() {
        let (result, _table) =
            resolve_source("fun main() { var x: Int = 1 \n if (x == 1) { } }");
        assert!(!result.diagnostics.has_errors());
    }

    #[test]
    fn if_expression_with_incompatible_branches_is_an_error() {
        let (result, _table) = resolve_source(
            "fun f(b: Boolean): Any { return if (b) 1 else \"no\" }",
        );
        assert!(result.diagnostics.has_errors());
    }

    #[test]
    fn if_expression_without_else_is_an_error() {
        let (result, _table) = resolve_source("fun main() { var x = if (true) 1 }");
        assert!(result.diagnostics.has_errors());
    }

    #[test]
    fn if_expression_common_type_is_accepted() {
        let (result, _table) = resolve_source(
            "fun f(b: Boolean): Int { return if (b) 1 else 2 }",
        );
        assert!(!result.diagnostics.has_errors());
    }
}
