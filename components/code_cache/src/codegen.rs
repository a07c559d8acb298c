//! Bytecode generation from the syntax tree.
//!
//! Every function becomes one [`BytecodeChunk`] nested in the chunk of the
//! function around it. Names resolve to a register of the current function,
//! to a captured variable of an enclosing one, or by name. Declarations at
//! the top level of a unit are stored by name, so the runtime can link
//! imports and exports against them.

use crate::ast::*;
use crate::bytecode::{
    BytecodeChunk, Constant, FunctionFlags, MethodKind, Opcode, RegisterId, UpvalueDescriptor,
};
use crate::compiler::UnitKind;
use core_types::{ErrorKind, JsError, SourcePosition};
use std::collections::{HashMap, HashSet};

/// Name under which `export default` stores its value.
pub const DEFAULT_EXPORT_BINDING: &str = "*default*";

const MAX_INLINE_ARGUMENTS: usize = u8::MAX as usize;

/// Compile a parsed unit into its top-level chunk.
pub fn generate(program: &Program, kind: UnitKind) -> Result<BytecodeChunk, JsError> {
    BytecodeGenerator::new(kind).generate(program)
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    register: RegisterId,
    is_const: bool,
}

enum Resolved {
    Local(RegisterId, bool),
    Upvalue(u32, bool),
    Global(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindMode {
    Initialize,
    Assign,
}

enum ControlKind {
    Loop,
    IteratorLoop,
    Switch,
    Label,
    Try,
    Finally(Vec<Statement>),
}

struct ControlFrame {
    kind: ControlKind,
    labels: Vec<String>,
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

enum Unwind {
    Nothing,
    CloseIterator,
    PopTry,
    Finally(Vec<Statement>),
}

/// Assignable place.
enum Target<'a> {
    Name(&'a Identifier),
    Named(&'a Expression, String),
    Computed(&'a Expression, &'a Expression),
}

struct FunctionState {
    chunk: BytecodeChunk,
    scopes: Vec<HashMap<String, Binding>>,
    next_register: u32,
    upvalues: Vec<UpvalueDescriptor>,
    controls: Vec<ControlFrame>,
    completion: Option<RegisterId>,
    is_arrow: bool,
    /// Instance fields a derived constructor defines after `super()`
    field_initializers: Vec<ClassMember>,
}

impl FunctionState {
    fn new(name: Option<String>, flags: FunctionFlags) -> Self {
        let mut chunk = BytecodeChunk::new();
        chunk.name = name;
        chunk.flags = flags;
        Self {
            chunk,
            scopes: vec![HashMap::new()],
            next_register: 0,
            upvalues: Vec::new(),
            controls: Vec::new(),
            completion: None,
            is_arrow: flags.is_arrow,
            field_initializers: Vec::new(),
        }
    }

    fn lookup(&self, name: &str) -> Option<Binding> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn add_upvalue(&mut self, descriptor: UpvalueDescriptor) -> u32 {
        if let Some(index) = self.upvalues.iter().position(|u| *u == descriptor) {
            return index as u32;
        }
        self.upvalues.push(descriptor);
        (self.upvalues.len() - 1) as u32
    }
}

/// Bytecode generator that turns a syntax tree into chunks.
pub struct BytecodeGenerator {
    kind: UnitKind,
    functions: Vec<FunctionState>,
    global_consts: HashSet<String>,
    chains: Vec<Vec<(usize, u32)>>,
    position: Option<SourcePosition>,
}

impl BytecodeGenerator {
    /// Generator for a `kind` unit.
    pub fn new(kind: UnitKind) -> Self {
        Self {
            kind,
            functions: Vec::new(),
            global_consts: HashSet::new(),
            chains: Vec::new(),
            position: None,
        }
    }

    /// Generate the top-level chunk. It returns the value of the last
    /// expression statement that ran.
    pub fn generate(mut self, program: &Program) -> Result<BytecodeChunk, JsError> {
        let name = match self.kind {
            UnitKind::Script => "script",
            UnitKind::Module => "module",
        };
        self.functions
            .push(FunctionState::new(Some(name.to_string()), FunctionFlags::default()));
        let completion = self.allocate_register();
        self.state().completion = Some(completion);
        self.emit(Opcode::LoadUndefined);
        self.emit(Opcode::StoreLocal(completion));
        self.emit(Opcode::Pop);

        self.declare_block(program.body.iter(), true)?;
        for statement in &program.body {
            self.visit_statement(statement)?;
        }

        self.emit(Opcode::LoadLocal(completion));
        self.emit(Opcode::Return);
        Ok(self.finish_function()?.0)
    }

    // Emission helpers

    fn state(&mut self) -> &mut FunctionState {
        let last = self.functions.len() - 1;
        &mut self.functions[last]
    }

    fn emit(&mut self, opcode: Opcode) -> usize {
        let position = self.position;
        let chunk = &mut self.state().chunk;
        match position {
            Some(position) => chunk.emit_with_position(opcode, position),
            None => chunk.emit(opcode),
        }
    }

    fn here(&mut self) -> usize {
        self.state().chunk.instruction_count()
    }

    fn patch(&mut self, jump: usize, target: usize) {
        self.state().chunk.patch_jump(jump, target);
    }

    fn patch_here(&mut self, jump: usize) {
        let target = self.here();
        self.patch(jump, target);
    }

    fn constant(&mut self, value: Constant) -> u32 {
        self.state().chunk.add_constant(value)
    }

    fn load_string(&mut self, value: &str) {
        let index = self.constant(Constant::String(value.to_string()));
        self.emit(Opcode::LoadConstant(index));
    }

    fn allocate_register(&mut self) -> RegisterId {
        let state = self.state();
        let register = RegisterId(state.next_register);
        state.next_register += 1;
        register
    }

    fn finish_function(&mut self) -> Result<(BytecodeChunk, Vec<UpvalueDescriptor>), JsError> {
        let state = self.functions.pop().ok_or_else(|| {
            JsError::new(ErrorKind::InternalError, "no function is being compiled")
        })?;
        let mut chunk = state.chunk;
        chunk.register_count = state.next_register;
        chunk.upvalue_count = state.upvalues.len() as u32;
        Ok((chunk, state.upvalues))
    }

    // Scopes and names

    fn is_global_scope(&self) -> bool {
        self.functions.len() == 1 && self.functions[0].scopes.len() == 1
    }

    fn push_scope(&mut self) {
        self.state().scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.state().scopes.pop();
    }

    fn declare(&mut self, name: &str, is_const: bool) {
        if self.is_global_scope() {
            if is_const {
                self.global_consts.insert(name.to_string());
            }
            return;
        }
        let exists = self
            .state()
            .scopes
            .last()
            .is_some_and(|scope| scope.contains_key(name));
        if exists {
            return;
        }
        let register = self.allocate_register();
        if let Some(scope) = self.state().scopes.last_mut() {
            scope.insert(name.to_string(), Binding { register, is_const });
        }
    }

    fn resolve(&mut self, name: &str) -> Resolved {
        let index = self.functions.len() - 1;
        self.resolve_in(index, name)
    }

    fn resolve_in(&mut self, index: usize, name: &str) -> Resolved {
        if let Some(binding) = self.functions[index].lookup(name) {
            return Resolved::Local(binding.register, binding.is_const);
        }
        if index == 0 {
            return Resolved::Global(self.global_consts.contains(name));
        }
        match self.resolve_in(index - 1, name) {
            Resolved::Local(register, is_const) => {
                let upvalue = self.functions[index].add_upvalue(UpvalueDescriptor::new(true, register.0));
                Resolved::Upvalue(upvalue, is_const)
            }
            Resolved::Upvalue(outer, is_const) => {
                let upvalue = self.functions[index].add_upvalue(UpvalueDescriptor::new(false, outer));
                Resolved::Upvalue(upvalue, is_const)
            }
            global => global,
        }
    }

    fn load_name(&mut self, name: &str) {
        match self.resolve(name) {
            Resolved::Local(register, _) => {
                self.emit(Opcode::LoadLocal(register));
            }
            Resolved::Upvalue(index, _) => {
                self.emit(Opcode::LoadUpvalue(index));
            }
            Resolved::Global(_) => {
                let in_function = self.functions.len() > 1 && !self.state().is_arrow;
                if name == "arguments" && in_function {
                    self.emit(Opcode::LoadArguments);
                } else {
                    self.emit(Opcode::LoadGlobal(name.to_string()));
                }
            }
        }
    }

    /// Store the top of the stack into `name`, leaving it there.
    fn store_name(&mut self, name: &str, mode: BindMode) {
        let (opcode, is_const) = match self.resolve(name) {
            Resolved::Local(register, is_const) => (Opcode::StoreLocal(register), is_const),
            Resolved::Upvalue(index, is_const) => (Opcode::StoreUpvalue(index), is_const),
            Resolved::Global(is_const) => (Opcode::StoreGlobal(name.to_string()), is_const),
        };
        if is_const && mode == BindMode::Assign {
            self.throw_type_error("Assignment to constant variable.");
            return;
        }
        self.emit(opcode);
    }

    fn throw_type_error(&mut self, message: &str) {
        self.emit(Opcode::LoadGlobal("TypeError".to_string()));
        self.load_string(message);
        self.emit(Opcode::CallNew(1));
        self.emit(Opcode::Throw);
    }

    /// Declare the bindings of a statement list and hoist its functions.
    /// At function level `var` names are declared too.
    fn declare_block<'s, I>(&mut self, statements: I, function_level: bool) -> Result<(), JsError>
    where
        I: IntoIterator<Item = &'s Statement> + Clone,
    {
        if function_level {
            let mut names = Vec::new();
            for statement in statements.clone() {
                var_declared_names(statement, &mut names);
            }
            for id in names {
                self.declare(&id.name, false);
            }
        }
        for statement in statements.clone() {
            match unwrap_export(statement) {
                Statement::VariableDeclaration {
                    kind: kind @ (VariableKind::Let | VariableKind::Const),
                    declarations,
                    ..
                } => {
                    for declaration in declarations {
                        for id in declaration.id.bound_names() {
                            self.declare(&id.name, *kind == VariableKind::Const);
                        }
                    }
                }
                Statement::ClassDeclaration { class, .. } => {
                    if let Some(name) = &class.name {
                        self.declare(&name.name, false);
                    }
                }
                Statement::FunctionDeclaration { function, .. } => {
                    if let Some(name) = &function.name {
                        self.declare(&name.name, false);
                    }
                }
                Statement::ExportDeclaration { export, .. } => match export {
                    Export::DefaultFunction(function) => {
                        if let Some(name) = &function.name {
                            self.declare(&name.name, false);
                        }
                    }
                    Export::DefaultClass(class) => {
                        if let Some(name) = &class.name {
                            self.declare(&name.name, false);
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }
        for statement in statements {
            match unwrap_export(statement) {
                Statement::FunctionDeclaration { function, .. } => {
                    self.compile_function(function, None)?;
                    if let Some(name) = &function.name {
                        self.store_name(&name.name, BindMode::Initialize);
                    }
                    self.emit(Opcode::Pop);
                }
                Statement::ExportDeclaration {
                    export: Export::DefaultFunction(function),
                    ..
                } => {
                    self.compile_function(function, Some("default".to_string()))?;
                    if let Some(name) = &function.name {
                        self.store_name(&name.name, BindMode::Initialize);
                    }
                    self.emit(Opcode::StoreGlobal(DEFAULT_EXPORT_BINDING.to_string()));
                    self.emit(Opcode::Pop);
                }
                _ => {}
            }
        }
        Ok(())
    }

    // Control frames

    fn push_control(&mut self, kind: ControlKind, labels: Vec<String>) {
        self.state().controls.push(ControlFrame {
            kind,
            labels,
            breaks: Vec::new(),
            continues: Vec::new(),
        });
    }

    fn pop_control(&mut self, break_target: usize, continue_target: usize) {
        if let Some(frame) = self.state().controls.pop() {
            for jump in frame.breaks {
                self.patch(jump, break_target);
            }
            for jump in frame.continues {
                self.patch(jump, continue_target);
            }
        }
    }

    /// Leave every control frame at index `floor` or above.
    fn unwind(&mut self, floor: usize) -> Result<(), JsError> {
        let mut index = self.state().controls.len();
        while index > floor {
            index -= 1;
            let action = match &self.state().controls[index].kind {
                ControlKind::IteratorLoop => Unwind::CloseIterator,
                ControlKind::Try => Unwind::PopTry,
                ControlKind::Finally(body) => Unwind::Finally(body.clone()),
                _ => Unwind::Nothing,
            };
            match action {
                Unwind::Nothing => {}
                Unwind::CloseIterator => {
                    self.emit(Opcode::IteratorClose);
                }
                Unwind::PopTry => {
                    self.emit(Opcode::PopTry);
                }
                Unwind::Finally(body) => {
                    self.emit(Opcode::PopFinally);
                    let saved = self.state().controls.split_off(index);
                    let result = self.visit_block(&body);
                    self.state().controls.extend(saved);
                    result?;
                }
            }
        }
        Ok(())
    }

    fn emit_break(&mut self, label: Option<&str>, position: SourcePosition) -> Result<(), JsError> {
        let target = self.state().controls.iter().rposition(|frame| match label {
            None => matches!(
                frame.kind,
                ControlKind::Loop | ControlKind::IteratorLoop | ControlKind::Switch
            ),
            Some(label) => frame.labels.iter().any(|l| l == label),
        });
        let Some(target) = target else {
            let message = match label {
                None => "Illegal break statement".to_string(),
                Some(label) => format!("Undefined label '{}'", label),
            };
            return Err(JsError::syntax(message, position));
        };
        self.unwind(target + 1)?;
        let jump = self.emit(Opcode::Jump(0));
        self.state().controls[target].breaks.push(jump);
        Ok(())
    }

    fn emit_continue(&mut self, label: Option<&str>, position: SourcePosition) -> Result<(), JsError> {
        let is_loop = |frame: &ControlFrame| {
            matches!(frame.kind, ControlKind::Loop | ControlKind::IteratorLoop)
        };
        let controls = &self.state().controls;
        let target = match label {
            None => controls.iter().rposition(is_loop),
            Some(label) => match controls.iter().rposition(|f| f.labels.iter().any(|l| l == label)) {
                Some(index) if is_loop(&controls[index]) => Some(index),
                Some(_) => {
                    return Err(JsError::syntax(
                        format!(
                            "Illegal continue statement: '{}' does not denote an iteration statement",
                            label
                        ),
                        position,
                    ))
                }
                None => {
                    return Err(JsError::syntax(format!("Undefined label '{}'", label), position))
                }
            },
        };
        let Some(target) = target else {
            return Err(JsError::syntax(
                "Illegal continue statement: no surrounding iteration statement",
                position,
            ));
        };
        self.unwind(target + 1)?;
        let jump = self.emit(Opcode::Jump(0));
        self.state().controls[target].continues.push(jump);
        Ok(())
    }

    fn emit_return(&mut self) -> Result<(), JsError> {
        let unwinds = self.state().controls.iter().any(|frame| {
            matches!(
                frame.kind,
                ControlKind::IteratorLoop | ControlKind::Try | ControlKind::Finally(_)
            )
        });
        if unwinds {
            let value = self.allocate_register();
            self.emit(Opcode::StoreLocal(value));
            self.emit(Opcode::Pop);
            self.unwind(0)?;
            self.emit(Opcode::LoadLocal(value));
        }
        self.emit(Opcode::Return);
        Ok(())
    }

    // Statements

    fn visit_statement(&mut self, statement: &Statement) -> Result<(), JsError> {
        self.visit_labeled(statement, Vec::new())
    }

    fn visit_labeled(&mut self, statement: &Statement, labels: Vec<String>) -> Result<(), JsError> {
        let saved = self.position.replace(statement.position());
        let result = self.statement(statement, labels);
        self.position = saved;
        result
    }

    fn statement(&mut self, statement: &Statement, labels: Vec<String>) -> Result<(), JsError> {
        match statement {
            Statement::VariableDeclaration {
                kind, declarations, ..
            } => {
                for declaration in declarations {
                    self.visit_declarator(*kind, declaration)?;
                }
            }

            // Hoisted by declare_block
            Statement::FunctionDeclaration { .. } => {}

            Statement::ClassDeclaration { class, .. } => {
                self.compile_class(class, None)?;
                if let Some(name) = &class.name {
                    self.store_name(&name.name, BindMode::Initialize);
                }
                self.emit(Opcode::Pop);
            }

            Statement::ExpressionStatement { expression, .. } => {
                self.visit_expression(expression)?;
                if let Some(completion) = self.state().completion {
                    self.emit(Opcode::StoreLocal(completion));
                }
                self.emit(Opcode::Pop);
            }

            Statement::ReturnStatement { argument, .. } => {
                match argument {
                    Some(argument) => self.visit_expression(argument)?,
                    None => {
                        self.emit(Opcode::LoadUndefined);
                    }
                }
                self.emit_return()?;
            }

            Statement::IfStatement {
                test,
                consequent,
                alternate,
                ..
            } => {
                self.visit_expression(test)?;
                let else_jump = self.emit(Opcode::JumpIfFalse(0));
                self.visit_statement(consequent)?;
                match alternate {
                    Some(alternate) => {
                        let end_jump = self.emit(Opcode::Jump(0));
                        self.patch_here(else_jump);
                        self.visit_statement(alternate)?;
                        self.patch_here(end_jump);
                    }
                    None => self.patch_here(else_jump),
                }
            }

            Statement::WhileStatement { test, body, .. } => {
                self.push_control(ControlKind::Loop, labels);
                let start = self.here();
                self.visit_expression(test)?;
                let exit = self.emit(Opcode::JumpIfFalse(0));
                self.visit_statement(body)?;
                self.emit(Opcode::Jump(start as u32));
                self.patch_here(exit);
                let end = self.here();
                self.pop_control(end, start);
            }

            Statement::DoWhileStatement { body, test, .. } => {
                self.push_control(ControlKind::Loop, labels);
                let start = self.here();
                self.visit_statement(body)?;
                let next = self.here();
                self.visit_expression(test)?;
                self.emit(Opcode::JumpIfTrue(start as u32));
                let end = self.here();
                self.pop_control(end, next);
            }

            Statement::ForStatement {
                init,
                test,
                update,
                body,
                ..
            } => {
                self.push_scope();
                match init {
                    Some(ForInit::VariableDeclaration { kind, declarations }) => {
                        if *kind != VariableKind::Var {
                            for declaration in declarations {
                                for id in declaration.id.bound_names() {
                                    self.declare(&id.name, *kind == VariableKind::Const);
                                }
                            }
                        }
                        for declaration in declarations {
                            self.visit_declarator(*kind, declaration)?;
                        }
                    }
                    Some(ForInit::Expression(expression)) => {
                        self.visit_expression(expression)?;
                        self.emit(Opcode::Pop);
                    }
                    None => {}
                }
                self.push_control(ControlKind::Loop, labels);
                let start = self.here();
                let exit = match test {
                    Some(test) => {
                        self.visit_expression(test)?;
                        Some(self.emit(Opcode::JumpIfFalse(0)))
                    }
                    None => None,
                };
                self.visit_statement(body)?;
                let next = self.here();
                if let Some(update) = update {
                    self.visit_expression(update)?;
                    self.emit(Opcode::Pop);
                }
                self.emit(Opcode::Jump(start as u32));
                if let Some(exit) = exit {
                    self.patch_here(exit);
                }
                let end = self.here();
                self.pop_control(end, next);
                self.pop_scope();
            }

            Statement::ForInStatement {
                left, right, body, ..
            } => {
                self.visit_iteration(left, right, body, Opcode::GetPropertyIterator, labels)?;
            }

            Statement::ForOfStatement {
                left,
                right,
                body,
                is_await,
                ..
            } => {
                let iterator = if *is_await {
                    Opcode::GetAsyncIterator
                } else {
                    Opcode::GetIterator
                };
                self.visit_iteration(left, right, body, iterator, labels)?;
            }

            Statement::BlockStatement { body, .. } => self.visit_block(body)?,

            Statement::EmptyStatement { .. } => {}

            Statement::BreakStatement { label, position } => {
                self.emit_break(label.as_deref(), *position)?;
            }

            Statement::ContinueStatement { label, position } => {
                self.emit_continue(label.as_deref(), *position)?;
            }

            Statement::ThrowStatement { argument, .. } => {
                self.visit_expression(argument)?;
                self.emit(Opcode::Throw);
            }

            Statement::TryStatement {
                block,
                handler,
                finalizer,
                ..
            } => self.visit_try(block, handler.as_ref(), finalizer.as_deref())?,

            Statement::SwitchStatement {
                discriminant,
                cases,
                ..
            } => self.visit_switch(discriminant, cases, labels)?,

            Statement::LabeledStatement { label, body, .. } => {
                let mut labels = labels;
                labels.push(label.clone());
                let takes_labels = matches!(
                    **body,
                    Statement::WhileStatement { .. }
                        | Statement::DoWhileStatement { .. }
                        | Statement::ForStatement { .. }
                        | Statement::ForInStatement { .. }
                        | Statement::ForOfStatement { .. }
                        | Statement::SwitchStatement { .. }
                        | Statement::LabeledStatement { .. }
                );
                if takes_labels {
                    return self.visit_labeled(body, labels);
                }
                self.push_control(ControlKind::Label, labels);
                self.visit_statement(body)?;
                let end = self.here();
                self.pop_control(end, end);
            }

            Statement::DebuggerStatement { .. } => {
                self.emit(Opcode::Debugger);
            }

            // Linked by the runtime from the unit's import list
            Statement::ImportDeclaration { .. } => {}

            Statement::ExportDeclaration { export, .. } => match export {
                Export::Named { .. } | Export::All { .. } | Export::DefaultFunction(_) => {}
                Export::Declaration(declaration) => self.visit_statement(declaration)?,
                Export::DefaultClass(class) => {
                    self.compile_class(class, Some("default".to_string()))?;
                    if let Some(name) = &class.name {
                        self.store_name(&name.name, BindMode::Initialize);
                    }
                    self.emit(Opcode::StoreGlobal(DEFAULT_EXPORT_BINDING.to_string()));
                    self.emit(Opcode::Pop);
                }
                Export::DefaultExpression(expression) => {
                    self.visit_named(expression, "default")?;
                    self.emit(Opcode::StoreGlobal(DEFAULT_EXPORT_BINDING.to_string()));
                    self.emit(Opcode::Pop);
                }
            },
        }
        Ok(())
    }

    fn visit_block(&mut self, body: &[Statement]) -> Result<(), JsError> {
        self.push_scope();
        let result = self.visit_statements(body);
        self.pop_scope();
        result
    }

    fn visit_statements(&mut self, body: &[Statement]) -> Result<(), JsError> {
        self.declare_block(body.iter(), false)?;
        for statement in body {
            self.visit_statement(statement)?;
        }
        Ok(())
    }

    fn visit_declarator(
        &mut self,
        kind: VariableKind,
        declaration: &VariableDeclarator,
    ) -> Result<(), JsError> {
        match &declaration.init {
            Some(init) => {
                match &declaration.id {
                    Pattern::Identifier(id) => self.visit_named(init, &id.name)?,
                    _ => self.visit_expression(init)?,
                }
                self.bind_pattern(&declaration.id, BindMode::Initialize)
            }
            None if kind == VariableKind::Var => Ok(()),
            None => {
                self.emit(Opcode::LoadUndefined);
                self.bind_pattern(&declaration.id, BindMode::Initialize)
            }
        }
    }

    /// `for-in`, `for-of` and `for await`. The iterator stays on the stack
    /// for the whole loop.
    fn visit_iteration(
        &mut self,
        left: &ForInOfLeft,
        right: &Expression,
        body: &Statement,
        get_iterator: Opcode,
        labels: Vec<String>,
    ) -> Result<(), JsError> {
        self.push_scope();
        if let ForInOfLeft::VariableDeclaration { kind, pattern } = left {
            if *kind != VariableKind::Var {
                for id in pattern.bound_names() {
                    self.declare(&id.name, *kind == VariableKind::Const);
                }
            }
        }
        self.visit_expression(right)?;
        self.emit(get_iterator);

        self.push_control(ControlKind::IteratorLoop, labels);
        let start = self.here();
        let next = self.emit(Opcode::IteratorNext(0));
        match left {
            ForInOfLeft::VariableDeclaration { pattern, .. } => {
                self.bind_pattern(pattern, BindMode::Initialize)?
            }
            ForInOfLeft::Pattern(pattern) => self.bind_pattern(pattern, BindMode::Assign)?,
        }
        self.visit_statement(body)?;
        self.emit(Opcode::Jump(start as u32));

        let close = self.here();
        self.emit(Opcode::IteratorClose);
        let skip = self.emit(Opcode::Jump(0));
        self.patch_here(next);
        self.emit(Opcode::Pop);
        self.patch_here(skip);
        self.pop_control(close, start);
        self.pop_scope();
        Ok(())
    }

    fn visit_try(
        &mut self,
        block: &[Statement],
        handler: Option<&CatchClause>,
        finalizer: Option<&[Statement]>,
    ) -> Result<(), JsError> {
        let finally_handler = match finalizer {
            Some(body) => {
                let push = self.emit(Opcode::PushFinally(0));
                self.push_control(ControlKind::Finally(body.to_vec()), Vec::new());
                Some(push)
            }
            None => None,
        };

        match handler {
            Some(handler) => {
                let push = self.emit(Opcode::PushTry(0));
                self.push_control(ControlKind::Try, Vec::new());
                self.visit_block(block)?;
                self.state().controls.pop();
                self.emit(Opcode::PopTry);
                let skip = self.emit(Opcode::Jump(0));

                // The runtime pushes the exception before jumping here.
                self.patch_here(push);
                self.push_scope();
                match &handler.param {
                    Some(param) => {
                        for id in param.bound_names() {
                            self.declare(&id.name, false);
                        }
                        self.bind_pattern(param, BindMode::Initialize)?;
                    }
                    None => {
                        self.emit(Opcode::Pop);
                    }
                }
                self.visit_statements(&handler.body)?;
                self.pop_scope();
                self.patch_here(skip);
            }
            None => self.visit_block(block)?,
        }

        if let (Some(push), Some(body)) = (finally_handler, finalizer) {
            self.state().controls.pop();
            self.emit(Opcode::PopFinally);
            self.visit_block(body)?;
            let skip = self.emit(Opcode::Jump(0));

            self.patch_here(push);
            let exception = self.allocate_register();
            self.emit(Opcode::StoreLocal(exception));
            self.emit(Opcode::Pop);
            self.visit_block(body)?;
            self.emit(Opcode::LoadLocal(exception));
            self.emit(Opcode::Throw);
            self.patch_here(skip);
        }
        Ok(())
    }

    fn visit_switch(
        &mut self,
        discriminant: &Expression,
        cases: &[SwitchCase],
        labels: Vec<String>,
    ) -> Result<(), JsError> {
        self.visit_expression(discriminant)?;
        let value = self.allocate_register();
        self.emit(Opcode::StoreLocal(value));
        self.emit(Opcode::Pop);

        self.push_scope();
        self.declare_block(cases.iter().flat_map(|case| case.consequent.iter()), false)?;

        let mut case_jumps = Vec::new();
        for (index, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                self.emit(Opcode::LoadLocal(value));
                self.visit_expression(test)?;
                self.emit(Opcode::StrictEqual);
                case_jumps.push((index, self.emit(Opcode::JumpIfTrue(0))));
            }
        }
        let default_jump = self.emit(Opcode::Jump(0));

        self.push_control(ControlKind::Switch, labels);
        let mut has_default = false;
        for (index, case) in cases.iter().enumerate() {
            let start = self.here();
            for (_, jump) in case_jumps.iter().filter(|(i, _)| *i == index) {
                self.patch(*jump, start);
            }
            if case.test.is_none() {
                has_default = true;
                self.patch(default_jump, start);
            }
            for statement in &case.consequent {
                self.visit_statement(statement)?;
            }
        }
        let end = self.here();
        if !has_default {
            self.patch(default_jump, end);
        }
        self.pop_control(end, end);
        self.pop_scope();
        Ok(())
    }

    // Bindings

    /// Bind the value on top of the stack to `pattern`, consuming it.
    fn bind_pattern(&mut self, pattern: &Pattern, mode: BindMode) -> Result<(), JsError> {
        match pattern {
            Pattern::Identifier(id) => {
                self.store_name(&id.name, mode);
                self.emit(Opcode::Pop);
            }
            Pattern::Expression(expression) => {
                match member_target(expression) {
                    Some(Target::Named(object, name)) => {
                        self.visit_target_object(object)?;
                        self.emit(Opcode::Swap);
                        self.emit(Opcode::StoreProperty(name));
                    }
                    Some(Target::Computed(object, key)) => {
                        self.visit_target_object(object)?;
                        self.emit(Opcode::Swap);
                        self.visit_expression(key)?;
                        self.emit(Opcode::Swap);
                        self.emit(Opcode::SetIndex);
                    }
                    _ => {
                        return Err(JsError::syntax(
                            "Invalid destructuring assignment target",
                            expression.position(),
                        ))
                    }
                }
                self.emit(Opcode::Pop);
            }
            Pattern::Assignment { target, default } => {
                self.emit(Opcode::Dup);
                let present = self.emit(Opcode::JumpIfNotUndefined(0));
                self.emit(Opcode::Pop);
                match &**target {
                    Pattern::Identifier(id) => self.visit_named(default, &id.name)?,
                    _ => self.visit_expression(default)?,
                }
                self.patch_here(present);
                self.bind_pattern(target, mode)?;
            }
            Pattern::Array { elements, rest } => {
                self.emit(Opcode::GetIterator);
                for element in elements {
                    self.emit(Opcode::IteratorValue);
                    match element {
                        Some(element) => self.bind_pattern(element, mode)?,
                        None => {
                            self.emit(Opcode::Pop);
                        }
                    }
                }
                if let Some(rest) = rest {
                    self.emit(Opcode::IteratorRest);
                    self.bind_pattern(rest, mode)?;
                }
                self.emit(Opcode::IteratorClose);
            }
            Pattern::Object { properties, rest } => {
                let mut taken = Vec::new();
                for property in properties {
                    self.emit(Opcode::Dup);
                    match &property.key {
                        PropertyKey::Named(name) | PropertyKey::Private(name) => {
                            taken.push(name.clone());
                            self.emit(Opcode::LoadProperty(name.clone()));
                        }
                        PropertyKey::Computed(key) => {
                            self.visit_expression(key)?;
                            self.emit(Opcode::GetIndex);
                        }
                    }
                    self.bind_pattern(&property.value, mode)?;
                }
                if let Some(rest) = rest {
                    self.emit(Opcode::ObjectRest(taken));
                    self.bind_pattern(rest, mode)?;
                }
                self.emit(Opcode::Pop);
            }
        }
        Ok(())
    }

    // Expressions

    fn visit_expression(&mut self, expression: &Expression) -> Result<(), JsError> {
        let saved = self.position.replace(expression.position());
        let result = self.expression(expression);
        self.position = saved;
        result
    }

    /// Visit `expression`, naming it `name` when it is an anonymous function
    /// or class.
    fn visit_named(&mut self, expression: &Expression, name: &str) -> Result<(), JsError> {
        match expression {
            Expression::Function(function) if function.name.is_none() => {
                self.compile_function(function, Some(name.to_string()))
            }
            Expression::Class(class) if class.name.is_none() => {
                self.compile_class(class, Some(name.to_string()))
            }
            _ => self.visit_expression(expression),
        }
    }

    fn expression(&mut self, expression: &Expression) -> Result<(), JsError> {
        match expression {
            Expression::Identifier(id) => self.load_name(&id.name),

            Expression::Literal { value, .. } => match value {
                Literal::Number(n) => {
                    let index = self.constant(Constant::Number(*n));
                    self.emit(Opcode::LoadConstant(index));
                }
                Literal::BigInt(digits) => {
                    let index = self.constant(Constant::BigInt(digits.clone()));
                    self.emit(Opcode::LoadConstant(index));
                }
                Literal::String(s) => self.load_string(s),
                Literal::Boolean(true) => {
                    self.emit(Opcode::LoadTrue);
                }
                Literal::Boolean(false) => {
                    self.emit(Opcode::LoadFalse);
                }
                Literal::Null => {
                    self.emit(Opcode::LoadNull);
                }
            },

            Expression::TemplateLiteral {
                quasis,
                expressions,
                ..
            } => {
                self.load_string(quasis.first().map(String::as_str).unwrap_or_default());
                for (index, expression) in expressions.iter().enumerate() {
                    self.visit_expression(expression)?;
                    self.emit(Opcode::ToString);
                    self.emit(Opcode::Add);
                    if let Some(quasi) = quasis.get(index + 1).filter(|q| !q.is_empty()) {
                        self.load_string(quasi);
                        self.emit(Opcode::Add);
                    }
                }
            }

            Expression::TaggedTemplate {
                tag,
                quasis,
                raw,
                expressions,
                ..
            } => self.visit_tagged_template(tag, quasis, raw, expressions)?,

            Expression::RegExp { pattern, flags, .. } => {
                let pattern = self.constant(Constant::String(pattern.clone()));
                let flags = self.constant(Constant::String(flags.clone()));
                self.emit(Opcode::CreateRegExp(pattern, flags));
            }

            Expression::Array { elements, .. } => self.visit_array_elements(elements)?,

            Expression::Object { properties, .. } => self.visit_object(properties)?,

            Expression::Function(function) => match &function.name {
                Some(name) => {
                    // Named function expressions see their own name.
                    self.push_scope();
                    self.declare(&name.name, true);
                    let result = self.compile_function(function, None);
                    if result.is_ok() {
                        self.store_name(&name.name, BindMode::Initialize);
                    }
                    self.pop_scope();
                    result?;
                }
                None => self.compile_function(function, None)?,
            },

            Expression::Class(class) => self.compile_class(class, None)?,

            Expression::Unary {
                operator, argument, ..
            } => self.visit_unary(*operator, argument)?,

            Expression::Update {
                operator,
                prefix,
                argument,
                ..
            } => self.visit_update(*operator, *prefix, argument)?,

            Expression::Binary {
                operator,
                left,
                right,
                ..
            } => {
                self.visit_expression(left)?;
                self.visit_expression(right)?;
                self.emit(binary_opcode(*operator));
            }

            Expression::Logical {
                operator,
                left,
                right,
                ..
            } => {
                self.visit_expression(left)?;
                self.emit(Opcode::Dup);
                let short = self.emit(short_circuit_jump(*operator));
                self.emit(Opcode::Pop);
                self.visit_expression(right)?;
                self.patch_here(short);
            }

            Expression::Assignment {
                operator,
                target,
                value,
                ..
            } => self.visit_assignment(*operator, target, value)?,

            Expression::Conditional {
                test,
                consequent,
                alternate,
                ..
            } => {
                self.visit_expression(test)?;
                let else_jump = self.emit(Opcode::JumpIfFalse(0));
                self.visit_expression(consequent)?;
                let end_jump = self.emit(Opcode::Jump(0));
                self.patch_here(else_jump);
                self.visit_expression(alternate)?;
                self.patch_here(end_jump);
            }

            Expression::Call {
                callee,
                arguments,
                optional,
                ..
            } => self.visit_call(callee, arguments, *optional)?,

            Expression::New {
                callee, arguments, ..
            } => {
                self.visit_expression(callee)?;
                match self.visit_arguments(arguments)? {
                    Some(count) => self.emit(Opcode::CallNew(count)),
                    None => self.emit(Opcode::CallNewWithArray),
                };
            }

            Expression::Member {
                object,
                property,
                optional,
                ..
            } => {
                if let Expression::Super { .. } = **object {
                    self.load_super_property(property)?;
                } else {
                    self.visit_expression(object)?;
                    if *optional {
                        self.optional_check(1, expression.position())?;
                    }
                    self.load_property(property)?;
                }
            }

            Expression::OptionalChain { expression, .. } => {
                self.chains.push(Vec::new());
                let result = self.visit_expression(expression);
                let jumps = self.chains.pop().unwrap_or_default();
                result?;
                if !jumps.is_empty() {
                    let end = self.emit(Opcode::Jump(0));
                    let deepest = jumps.iter().map(|(_, depth)| *depth).max().unwrap_or(0);
                    for depth in (1..=deepest).rev() {
                        let landing = self.here();
                        for (jump, _) in jumps.iter().filter(|(_, d)| *d == depth) {
                            self.patch(*jump, landing);
                        }
                        self.emit(Opcode::Pop);
                    }
                    self.emit(Opcode::LoadUndefined);
                    self.patch_here(end);
                }
            }

            Expression::Sequence { expressions, .. } => {
                for (index, expression) in expressions.iter().enumerate() {
                    if index > 0 {
                        self.emit(Opcode::Pop);
                    }
                    self.visit_expression(expression)?;
                }
            }

            Expression::This { .. } => {
                self.emit(Opcode::LoadThis);
            }

            Expression::Super { position } => {
                return Err(JsError::syntax("'super' keyword unexpected here", *position))
            }

            Expression::NewTarget { .. } => {
                self.emit(Opcode::LoadNewTarget);
            }

            Expression::ImportMeta { .. } => {
                self.emit(Opcode::LoadImportMeta);
            }

            Expression::ImportCall { source, .. } => {
                self.visit_expression(source)?;
                self.emit(Opcode::ImportCall);
            }

            Expression::Await { argument, .. } => {
                self.visit_expression(argument)?;
                self.emit(Opcode::Await);
            }

            Expression::Yield {
                argument, delegate, ..
            } => {
                match argument {
                    Some(argument) => self.visit_expression(argument)?,
                    None => {
                        self.emit(Opcode::LoadUndefined);
                    }
                }
                self.emit(if *delegate {
                    Opcode::YieldDelegate
                } else {
                    Opcode::Yield
                });
            }
        }
        Ok(())
    }

    /// Short-circuit to undefined when the top of the stack is nullish;
    /// `depth` values belonging to the chain are on the stack.
    fn optional_check(&mut self, depth: u32, position: SourcePosition) -> Result<(), JsError> {
        self.emit(Opcode::Dup);
        let jump = self.emit(Opcode::JumpIfNullish(0));
        match self.chains.last_mut() {
            Some(chain) => {
                chain.push((jump, depth));
                Ok(())
            }
            None => Err(JsError::syntax("Invalid optional chain", position)),
        }
    }

    fn load_property(&mut self, property: &PropertyKey) -> Result<(), JsError> {
        match property {
            PropertyKey::Named(name) | PropertyKey::Private(name) => {
                self.emit(Opcode::LoadProperty(name.clone()));
            }
            PropertyKey::Computed(key) => {
                self.visit_expression(key)?;
                self.emit(Opcode::GetIndex);
            }
        }
        Ok(())
    }

    fn load_super_property(&mut self, property: &PropertyKey) -> Result<(), JsError> {
        match property {
            PropertyKey::Named(name) | PropertyKey::Private(name) => {
                self.emit(Opcode::LoadSuperProperty(name.clone()));
            }
            PropertyKey::Computed(key) => {
                self.visit_expression(key)?;
                self.emit(Opcode::LoadSuperIndex);
            }
        }
        Ok(())
    }

    /// Object of an assignment target; stores through `super` land on `this`.
    fn visit_target_object(&mut self, object: &Expression) -> Result<(), JsError> {
        match object {
            Expression::Super { .. } => {
                self.emit(Opcode::LoadThis);
                Ok(())
            }
            _ => self.visit_expression(object),
        }
    }

    /// Push call arguments. Returns the count, or None when they were
    /// collected into one array.
    fn visit_arguments(&mut self, arguments: &[ArrayElement]) -> Result<Option<u8>, JsError> {
        let spread = arguments
            .iter()
            .any(|argument| matches!(argument, ArrayElement::Spread(_)));
        if spread || arguments.len() > MAX_INLINE_ARGUMENTS {
            self.visit_array_elements(arguments)?;
            return Ok(None);
        }
        for argument in arguments {
            if let ArrayElement::Expression(expression) = argument {
                self.visit_expression(expression)?;
            }
        }
        Ok(Some(arguments.len() as u8))
    }

    fn visit_array_elements(&mut self, elements: &[ArrayElement]) -> Result<(), JsError> {
        self.emit(Opcode::CreateArray);
        for element in elements {
            match element {
                ArrayElement::Expression(expression) => {
                    self.visit_expression(expression)?;
                    self.emit(Opcode::ArrayPush);
                }
                ArrayElement::Spread(expression) => {
                    self.visit_expression(expression)?;
                    self.emit(Opcode::ArraySpread);
                }
                ArrayElement::Hole => {
                    self.emit(Opcode::ArrayHole);
                }
            }
        }
        Ok(())
    }

    fn visit_object(&mut self, properties: &[ObjectProperty]) -> Result<(), JsError> {
        self.emit(Opcode::CreateObject);
        for property in properties {
            match property {
                ObjectProperty::Property { key, value } => match key {
                    PropertyKey::Named(name) => {
                        self.visit_named(value, name)?;
                        self.emit(Opcode::DefineField(name.clone()));
                    }
                    PropertyKey::Computed(key) => {
                        self.visit_expression(key)?;
                        self.visit_expression(value)?;
                        self.emit(Opcode::DefineComputedField);
                    }
                    PropertyKey::Private(name) => return Err(self.private_outside_class(name)),
                },
                ObjectProperty::Method {
                    key,
                    kind,
                    function,
                } => match key {
                    PropertyKey::Named(name) => {
                        self.compile_function(function, Some(name.clone()))?;
                        self.emit(Opcode::DefineMethod(name.clone(), method_kind(*kind)));
                    }
                    PropertyKey::Computed(key) => {
                        self.visit_expression(key)?;
                        self.compile_function(function, None)?;
                        self.emit(Opcode::DefineComputedMethod(method_kind(*kind)));
                    }
                    PropertyKey::Private(name) => return Err(self.private_outside_class(name)),
                },
                ObjectProperty::Spread(source) => {
                    self.visit_expression(source)?;
                    self.emit(Opcode::CopyDataProperties);
                }
                ObjectProperty::CoverInitializedName { name, .. } => {
                    return Err(JsError::syntax(
                        "Invalid shorthand property initializer",
                        name.position,
                    ))
                }
            }
        }
        Ok(())
    }

    fn private_outside_class(&self, name: &str) -> JsError {
        JsError::syntax(
            format!("Unexpected private name {}", name),
            self.position.unwrap_or_else(SourcePosition::start),
        )
    }

    fn visit_call(
        &mut self,
        callee: &Expression,
        arguments: &[ArrayElement],
        optional: bool,
    ) -> Result<(), JsError> {
        let position = callee.position();
        let is_method = match callee {
            Expression::Super { .. } => {
                match self.visit_arguments(arguments)? {
                    Some(count) => self.emit(Opcode::SuperCall(count)),
                    None => self.emit(Opcode::SuperCallWithArray),
                };
                let fields = self.state().field_initializers.clone();
                return self.emit_field_initializers(&fields);
            }
            Expression::Member {
                object,
                property,
                optional: member_optional,
                ..
            } => {
                if let Expression::Super { .. } = **object {
                    self.emit(Opcode::LoadThis);
                    self.load_super_property(property)?;
                } else {
                    self.visit_expression(object)?;
                    if *member_optional {
                        self.optional_check(1, position)?;
                    }
                    self.emit(Opcode::Dup);
                    self.load_property(property)?;
                }
                true
            }
            _ => {
                self.visit_expression(callee)?;
                false
            }
        };
        if optional {
            self.optional_check(if is_method { 2 } else { 1 }, position)?;
        }
        let count = self.visit_arguments(arguments)?;
        self.emit(match (is_method, count) {
            (true, Some(count)) => Opcode::CallMethod(count),
            (true, None) => Opcode::CallMethodWithArray,
            (false, Some(count)) => Opcode::Call(count),
            (false, None) => Opcode::CallWithArray,
        });
        Ok(())
    }

    fn visit_tagged_template(
        &mut self,
        tag: &Expression,
        quasis: &[Option<String>],
        raw: &[String],
        expressions: &[Expression],
    ) -> Result<(), JsError> {
        let is_method = match tag {
            Expression::Member {
                object, property, ..
            } => {
                if let Expression::Super { .. } = **object {
                    self.emit(Opcode::LoadThis);
                    self.load_super_property(property)?;
                } else {
                    self.visit_expression(object)?;
                    self.emit(Opcode::Dup);
                    self.load_property(property)?;
                }
                true
            }
            _ => {
                self.visit_expression(tag)?;
                false
            }
        };

        let inline = expressions.len() < MAX_INLINE_ARGUMENTS;
        if !inline {
            self.emit(Opcode::CreateArray);
        }
        self.emit(Opcode::CreateArray);
        for quasi in quasis {
            match quasi {
                Some(cooked) => self.load_string(cooked),
                None => {
                    self.emit(Opcode::LoadUndefined);
                }
            }
            self.emit(Opcode::ArrayPush);
        }
        self.emit(Opcode::Dup);
        self.emit(Opcode::CreateArray);
        for part in raw {
            self.load_string(part);
            self.emit(Opcode::ArrayPush);
        }
        self.emit(Opcode::StoreProperty("raw".to_string()));
        self.emit(Opcode::Pop);
        if !inline {
            self.emit(Opcode::ArrayPush);
        }
        for expression in expressions {
            self.visit_expression(expression)?;
            if !inline {
                self.emit(Opcode::ArrayPush);
            }
        }

        let count = (expressions.len() + 1) as u8;
        self.emit(match (is_method, inline) {
            (true, true) => Opcode::CallMethod(count),
            (true, false) => Opcode::CallMethodWithArray,
            (false, true) => Opcode::Call(count),
            (false, false) => Opcode::CallWithArray,
        });
        Ok(())
    }

    fn visit_unary(&mut self, operator: UnaryOperator, argument: &Expression) -> Result<(), JsError> {
        match operator {
            UnaryOperator::Typeof => {
                if let Expression::Identifier(id) = argument {
                    if let Resolved::Global(_) = self.resolve(&id.name) {
                        self.emit(Opcode::TypeofGlobal(id.name.clone()));
                        return Ok(());
                    }
                }
                self.visit_expression(argument)?;
                self.emit(Opcode::Typeof);
            }
            UnaryOperator::Delete => match argument {
                Expression::Identifier(id) => match self.resolve(&id.name) {
                    Resolved::Global(_) => {
                        self.emit(Opcode::DeleteGlobal(id.name.clone()));
                    }
                    _ => {
                        self.emit(Opcode::LoadFalse);
                    }
                },
                Expression::Member {
                    object, property, ..
                } if !matches!(**object, Expression::Super { .. }) => {
                    self.visit_expression(object)?;
                    match property {
                        PropertyKey::Named(name) | PropertyKey::Private(name) => {
                            self.emit(Opcode::DeleteProperty(name.clone()));
                        }
                        PropertyKey::Computed(key) => {
                            self.visit_expression(key)?;
                            self.emit(Opcode::DeleteIndex);
                        }
                    }
                }
                _ => {
                    self.visit_expression(argument)?;
                    self.emit(Opcode::Pop);
                    self.emit(Opcode::LoadTrue);
                }
            },
            _ => {
                self.visit_expression(argument)?;
                self.emit(match operator {
                    UnaryOperator::Minus => Opcode::Neg,
                    UnaryOperator::Plus => Opcode::ToNumber,
                    UnaryOperator::Not => Opcode::Not,
                    UnaryOperator::BitwiseNot => Opcode::BitNot,
                    _ => Opcode::Void,
                });
            }
        }
        Ok(())
    }

    fn visit_update(
        &mut self,
        operator: UpdateOperator,
        prefix: bool,
        argument: &Expression,
    ) -> Result<(), JsError> {
        let step = match operator {
            UpdateOperator::Increment => Opcode::Increment,
            UpdateOperator::Decrement => Opcode::Decrement,
        };
        let Some(target) = expression_target(argument) else {
            return Err(JsError::syntax(
                "Invalid left-hand side expression in update operation",
                argument.position(),
            ));
        };
        match target {
            Target::Name(id) => {
                self.load_name(&id.name);
                if prefix {
                    self.emit(step);
                    self.store_name(&id.name, BindMode::Assign);
                } else {
                    self.emit(Opcode::ToNumeric);
                    self.emit(Opcode::Dup);
                    self.emit(step);
                    self.store_name(&id.name, BindMode::Assign);
                    self.emit(Opcode::Pop);
                }
            }
            Target::Named(object, name) => {
                self.visit_target_object(object)?;
                self.emit(Opcode::Dup);
                self.emit(Opcode::LoadProperty(name.clone()));
                if prefix {
                    self.emit(step);
                    self.emit(Opcode::StoreProperty(name));
                } else {
                    let old = self.allocate_register();
                    self.emit(Opcode::ToNumeric);
                    self.emit(Opcode::StoreLocal(old));
                    self.emit(step);
                    self.emit(Opcode::StoreProperty(name));
                    self.emit(Opcode::Pop);
                    self.emit(Opcode::LoadLocal(old));
                }
            }
            Target::Computed(object, key) => {
                self.visit_target_object(object)?;
                self.visit_expression(key)?;
                self.emit(Opcode::Dup2);
                self.emit(Opcode::GetIndex);
                if prefix {
                    self.emit(step);
                    self.emit(Opcode::SetIndex);
                } else {
                    let old = self.allocate_register();
                    self.emit(Opcode::ToNumeric);
                    self.emit(Opcode::StoreLocal(old));
                    self.emit(step);
                    self.emit(Opcode::SetIndex);
                    self.emit(Opcode::Pop);
                    self.emit(Opcode::LoadLocal(old));
                }
            }
        }
        Ok(())
    }

    fn visit_assignment(
        &mut self,
        operator: AssignmentOperator,
        target: &Pattern,
        value: &Expression,
    ) -> Result<(), JsError> {
        let place = match target {
            Pattern::Identifier(id) => Some(Target::Name(id)),
            Pattern::Expression(expression) => member_target(expression),
            _ => None,
        };
        let Some(place) = place else {
            if operator != AssignmentOperator::Assign {
                return Err(JsError::syntax(
                    "Invalid left-hand side in assignment",
                    value.position(),
                ));
            }
            self.visit_expression(value)?;
            self.emit(Opcode::Dup);
            return self.bind_pattern(target, BindMode::Assign);
        };

        match operator {
            AssignmentOperator::Assign => match place {
                Target::Name(id) => {
                    self.visit_named(value, &id.name)?;
                    self.store_name(&id.name, BindMode::Assign);
                }
                Target::Named(object, name) => {
                    self.visit_target_object(object)?;
                    self.visit_expression(value)?;
                    self.emit(Opcode::StoreProperty(name));
                }
                Target::Computed(object, key) => {
                    self.visit_target_object(object)?;
                    self.visit_expression(key)?;
                    self.visit_expression(value)?;
                    self.emit(Opcode::SetIndex);
                }
            },

            AssignmentOperator::Compound(operator) => match place {
                Target::Name(id) => {
                    self.load_name(&id.name);
                    self.visit_expression(value)?;
                    self.emit(binary_opcode(operator));
                    self.store_name(&id.name, BindMode::Assign);
                }
                Target::Named(object, name) => {
                    self.visit_target_object(object)?;
                    self.emit(Opcode::Dup);
                    self.emit(Opcode::LoadProperty(name.clone()));
                    self.visit_expression(value)?;
                    self.emit(binary_opcode(operator));
                    self.emit(Opcode::StoreProperty(name));
                }
                Target::Computed(object, key) => {
                    self.visit_target_object(object)?;
                    self.visit_expression(key)?;
                    self.emit(Opcode::Dup2);
                    self.emit(Opcode::GetIndex);
                    self.visit_expression(value)?;
                    self.emit(binary_opcode(operator));
                    self.emit(Opcode::SetIndex);
                }
            },

            AssignmentOperator::Logical(operator) => match place {
                Target::Name(id) => {
                    self.load_name(&id.name);
                    self.emit(Opcode::Dup);
                    let short = self.emit(short_circuit_jump(operator));
                    self.emit(Opcode::Pop);
                    self.visit_named(value, &id.name)?;
                    self.store_name(&id.name, BindMode::Assign);
                    self.patch_here(short);
                }
                Target::Named(object, name) => {
                    self.visit_target_object(object)?;
                    self.emit(Opcode::Dup);
                    self.emit(Opcode::LoadProperty(name.clone()));
                    self.emit(Opcode::Dup);
                    let short = self.emit(short_circuit_jump(operator));
                    self.emit(Opcode::Pop);
                    self.visit_expression(value)?;
                    self.emit(Opcode::StoreProperty(name));
                    let end = self.emit(Opcode::Jump(0));
                    self.patch_here(short);
                    self.emit(Opcode::Swap);
                    self.emit(Opcode::Pop);
                    self.patch_here(end);
                }
                Target::Computed(object, key) => {
                    self.visit_target_object(object)?;
                    self.visit_expression(key)?;
                    self.emit(Opcode::Dup2);
                    self.emit(Opcode::GetIndex);
                    self.emit(Opcode::Dup);
                    let short = self.emit(short_circuit_jump(operator));
                    self.emit(Opcode::Pop);
                    self.visit_expression(value)?;
                    self.emit(Opcode::SetIndex);
                    let end = self.emit(Opcode::Jump(0));
                    self.patch_here(short);
                    self.emit(Opcode::Rot3);
                    self.emit(Opcode::Pop);
                    self.emit(Opcode::Pop);
                    self.patch_here(end);
                }
            },
        }
        Ok(())
    }

    // Functions and classes

    /// Compile `function` into a nested chunk and push a closure over it.
    fn compile_function(&mut self, function: &Function, name: Option<String>) -> Result<(), JsError> {
        let flags = FunctionFlags {
            is_async: function.is_async,
            is_generator: function.is_generator,
            is_arrow: function.is_arrow,
            ..FunctionFlags::default()
        };
        let name = function.name.as_ref().map(|n| n.name.clone()).or(name);
        self.functions.push(FunctionState::new(name, flags));
        let result = self.function_body(function, None);
        self.close_function(result)
    }

    fn close_function(&mut self, body: Result<(), JsError>) -> Result<(), JsError> {
        let (chunk, upvalues) = self.finish_function()?;
        body?;
        let index = self.state().chunk.add_nested_function(chunk);
        self.emit(Opcode::CreateClosure(index, upvalues));
        Ok(())
    }

    /// Parameters and body. `fields` are the instance fields of a class
    /// whose constructor this is.
    fn function_body(
        &mut self,
        function: &Function,
        fields: Option<&[ClassMember]>,
    ) -> Result<(), JsError> {
        let saved = self.position.replace(function.position);
        let result = self.function_contents(function, fields);
        self.position = saved;
        result
    }

    fn function_contents(
        &mut self,
        function: &Function,
        fields: Option<&[ClassMember]>,
    ) -> Result<(), JsError> {
        let params: Vec<RegisterId> = function
            .params
            .iter()
            .map(|_| self.allocate_register())
            .collect();
        self.state().chunk.param_count = params.len() as u32;

        for (param, register) in function.params.iter().zip(&params) {
            match param {
                Pattern::Identifier(id) => {
                    let binding = Binding {
                        register: *register,
                        is_const: false,
                    };
                    self.state().scopes[0].insert(id.name.clone(), binding);
                }
                other => {
                    for id in other.bound_names() {
                        self.declare(&id.name, false);
                    }
                }
            }
        }
        if let Some(rest) = &function.rest {
            for id in rest.bound_names() {
                self.declare(&id.name, false);
            }
        }
        for (param, register) in function.params.iter().zip(&params) {
            if !matches!(param, Pattern::Identifier(_)) {
                self.emit(Opcode::LoadLocal(*register));
                self.bind_pattern(param, BindMode::Initialize)?;
            }
        }
        if let Some(rest) = &function.rest {
            self.emit(Opcode::LoadRestArguments(params.len() as u32));
            self.bind_pattern(rest, BindMode::Initialize)?;
        }

        let derived = self.state().chunk.flags.is_derived;
        if let Some(fields) = fields {
            if derived {
                self.state().field_initializers = fields.to_vec();
            } else {
                self.emit_field_initializers(fields)?;
            }
        }

        match &function.body {
            FunctionBody::Block(body) => {
                self.declare_block(body.iter(), true)?;
                for statement in body {
                    self.visit_statement(statement)?;
                }
                if self.state().chunk.flags.is_class_constructor {
                    self.emit(Opcode::LoadThis);
                } else {
                    self.emit(Opcode::LoadUndefined);
                }
                self.emit(Opcode::Return);
            }
            FunctionBody::Expression(expression) => {
                self.visit_expression(expression)?;
                self.emit(Opcode::Return);
            }
        }
        Ok(())
    }

    fn emit_field_initializers(&mut self, fields: &[ClassMember]) -> Result<(), JsError> {
        for field in fields {
            let ClassMember::Field { key, value, .. } = field else {
                continue;
            };
            self.emit(Opcode::LoadThis);
            if let PropertyKey::Computed(key) = key {
                self.visit_expression(key)?;
            }
            match value {
                Some(value) => match key {
                    PropertyKey::Named(name) | PropertyKey::Private(name) => {
                        self.visit_named(value, name)?
                    }
                    PropertyKey::Computed(_) => self.visit_expression(value)?,
                },
                None => {
                    self.emit(Opcode::LoadUndefined);
                }
            }
            match key {
                PropertyKey::Named(name) | PropertyKey::Private(name) => {
                    self.emit(Opcode::DefineField(name.clone()));
                }
                PropertyKey::Computed(_) => {
                    self.emit(Opcode::DefineComputedField);
                }
            }
            self.emit(Opcode::Pop);
        }
        Ok(())
    }

    /// Push the class built from `class`.
    fn compile_class(&mut self, class: &Class, name: Option<String>) -> Result<(), JsError> {
        let class_name = class.name.as_ref().map(|n| n.name.clone()).or(name);
        // The class body sees its own name as an immutable binding.
        self.push_scope();
        if let Some(inner) = &class.name {
            self.declare(&inner.name, true);
        }
        let result = self.class_body(class, class_name);
        if result.is_ok() {
            if let Some(inner) = &class.name {
                self.store_name(&inner.name, BindMode::Initialize);
            }
        }
        self.pop_scope();
        result
    }

    fn class_body(&mut self, class: &Class, class_name: Option<String>) -> Result<(), JsError> {
        let derived = class.super_class.is_some();
        if let Some(parent) = &class.super_class {
            self.visit_expression(parent)?;
        }

        let instance_fields: Vec<ClassMember> = class
            .members
            .iter()
            .filter(|member| matches!(member, ClassMember::Field { is_static: false, .. }))
            .cloned()
            .collect();
        let flags = FunctionFlags {
            is_class_constructor: true,
            is_derived: derived,
            ..FunctionFlags::default()
        };
        self.functions
            .push(FunctionState::new(class_name.clone(), flags));
        let result = match &class.constructor {
            Some(constructor) => self.function_body(constructor, Some(instance_fields.as_slice())),
            None => self.implicit_constructor(derived, &instance_fields),
        };
        self.close_function(result)?;
        self.emit(Opcode::CreateClass(class_name.unwrap_or_default(), derived));

        for member in &class.members {
            match member {
                ClassMember::Method {
                    key,
                    kind,
                    is_static,
                    function,
                } => match key {
                    PropertyKey::Named(name) | PropertyKey::Private(name) => {
                        self.compile_function(function, Some(name.clone()))?;
                        self.emit(Opcode::DefineClassMethod(
                            name.clone(),
                            method_kind(*kind),
                            *is_static,
                        ));
                    }
                    PropertyKey::Computed(key) => {
                        self.visit_expression(key)?;
                        self.compile_function(function, None)?;
                        self.emit(Opcode::DefineComputedClassMethod(method_kind(*kind), *is_static));
                    }
                },
                ClassMember::Field {
                    key,
                    is_static: true,
                    value,
                } => {
                    if let PropertyKey::Computed(key) = key {
                        self.visit_expression(key)?;
                    }
                    match value {
                        // Runs with the class as `this`.
                        Some(value) => {
                            let initializer = Function {
                                name: None,
                                params: Vec::new(),
                                rest: None,
                                body: FunctionBody::Expression(Box::new(value.clone())),
                                is_async: false,
                                is_generator: false,
                                is_arrow: false,
                                position: value.position(),
                            };
                            self.call_on_class(&initializer, matches!(key, PropertyKey::Computed(_)))?;
                        }
                        None => {
                            self.emit(Opcode::LoadUndefined);
                        }
                    }
                    match key {
                        PropertyKey::Named(name) | PropertyKey::Private(name) => {
                            self.emit(Opcode::DefineField(name.clone()));
                        }
                        PropertyKey::Computed(_) => {
                            self.emit(Opcode::DefineComputedField);
                        }
                    }
                }
                ClassMember::Field { .. } => {}
                ClassMember::StaticBlock { body, position } => {
                    let block = Function {
                        name: None,
                        params: Vec::new(),
                        rest: None,
                        body: FunctionBody::Block(body.clone()),
                        is_async: false,
                        is_generator: false,
                        is_arrow: false,
                        position: *position,
                    };
                    self.call_on_class(&block, false)?;
                    self.emit(Opcode::Pop);
                }
            }
        }
        Ok(())
    }

    /// Call `function` with the class as `this`. The class sits below the
    /// top of the stack when `key_on_stack` is set.
    fn call_on_class(&mut self, function: &Function, key_on_stack: bool) -> Result<(), JsError> {
        if key_on_stack {
            self.emit(Opcode::Dup2);
            self.emit(Opcode::Pop);
        } else {
            self.emit(Opcode::Dup);
        }
        self.compile_function(function, None)?;
        self.emit(Opcode::CallMethod(0));
        Ok(())
    }

    fn implicit_constructor(&mut self, derived: bool, fields: &[ClassMember]) -> Result<(), JsError> {
        if derived {
            self.emit(Opcode::LoadRestArguments(0));
            self.emit(Opcode::SuperCallWithArray);
            self.emit(Opcode::Pop);
        }
        self.emit_field_initializers(fields)?;
        self.emit(Opcode::LoadThis);
        self.emit(Opcode::Return);
        Ok(())
    }
}

fn unwrap_export(statement: &Statement) -> &Statement {
    match statement {
        Statement::ExportDeclaration {
            export: Export::Declaration(inner),
            ..
        } => inner,
        other => other,
    }
}

fn add_names<'s>(pattern: &'s Pattern, names: &mut Vec<&'s Identifier>) {
    for id in pattern.bound_names() {
        if !names.iter().any(|known| known.name == id.name) {
            names.push(id);
        }
    }
}

/// Names a `var` in `statement` declares, not looking into nested functions.
pub(crate) fn var_declared_names<'s>(statement: &'s Statement, names: &mut Vec<&'s Identifier>) {
    match statement {
        Statement::VariableDeclaration {
            kind: VariableKind::Var,
            declarations,
            ..
        } => {
            for declaration in declarations {
                add_names(&declaration.id, names);
            }
        }
        Statement::IfStatement {
            consequent,
            alternate,
            ..
        } => {
            var_declared_names(consequent, names);
            if let Some(alternate) = alternate {
                var_declared_names(alternate, names);
            }
        }
        Statement::WhileStatement { body, .. }
        | Statement::DoWhileStatement { body, .. }
        | Statement::LabeledStatement { body, .. } => var_declared_names(body, names),
        Statement::ForStatement { init, body, .. } => {
            if let Some(ForInit::VariableDeclaration {
                kind: VariableKind::Var,
                declarations,
            }) = init
            {
                for declaration in declarations {
                    add_names(&declaration.id, names);
                }
            }
            var_declared_names(body, names);
        }
        Statement::ForInStatement { left, body, .. } | Statement::ForOfStatement { left, body, .. } => {
            if let ForInOfLeft::VariableDeclaration {
                kind: VariableKind::Var,
                pattern,
            } = left
            {
                add_names(pattern, names);
            }
            var_declared_names(body, names);
        }
        Statement::BlockStatement { body, .. } => {
            body.iter().for_each(|s| var_declared_names(s, names));
        }
        Statement::TryStatement {
            block,
            handler,
            finalizer,
            ..
        } => {
            block.iter().for_each(|s| var_declared_names(s, names));
            if let Some(handler) = handler {
                handler.body.iter().for_each(|s| var_declared_names(s, names));
            }
            if let Some(finalizer) = finalizer {
                finalizer.iter().for_each(|s| var_declared_names(s, names));
            }
        }
        Statement::SwitchStatement { cases, .. } => {
            for case in cases {
                case.consequent.iter().for_each(|s| var_declared_names(s, names));
            }
        }
        Statement::ExportDeclaration {
            export: Export::Declaration(inner),
            ..
        } => var_declared_names(inner, names),
        _ => {}
    }
}

fn member_target(expression: &Expression) -> Option<Target<'_>> {
    match expression {
        Expression::Member {
            object,
            property,
            optional: false,
            ..
        } => Some(match property {
            PropertyKey::Named(name) | PropertyKey::Private(name) => {
                Target::Named(object, name.clone())
            }
            PropertyKey::Computed(key) => Target::Computed(object, key),
        }),
        _ => None,
    }
}

fn expression_target(expression: &Expression) -> Option<Target<'_>> {
    match expression {
        Expression::Identifier(id) => Some(Target::Name(id)),
        other => member_target(other),
    }
}

fn method_kind(kind: AccessorKind) -> MethodKind {
    match kind {
        AccessorKind::Method => MethodKind::Method,
        AccessorKind::Getter => MethodKind::Getter,
        AccessorKind::Setter => MethodKind::Setter,
    }
}

/// Jump taken when a logical operator skips its right side.
fn short_circuit_jump(operator: LogicalOperator) -> Opcode {
    match operator {
        LogicalOperator::And => Opcode::JumpIfFalse(0),
        LogicalOperator::Or => Opcode::JumpIfTrue(0),
        LogicalOperator::NullishCoalescing => Opcode::JumpIfNotNullish(0),
    }
}

fn binary_opcode(operator: BinaryOperator) -> Opcode {
    match operator {
        BinaryOperator::Add => Opcode::Add,
        BinaryOperator::Sub => Opcode::Sub,
        BinaryOperator::Mul => Opcode::Mul,
        BinaryOperator::Div => Opcode::Div,
        BinaryOperator::Mod => Opcode::Mod,
        BinaryOperator::Exp => Opcode::Exp,
        BinaryOperator::Equal => Opcode::Equal,
        BinaryOperator::NotEqual => Opcode::NotEqual,
        BinaryOperator::StrictEqual => Opcode::StrictEqual,
        BinaryOperator::StrictNotEqual => Opcode::StrictNotEqual,
        BinaryOperator::LessThan => Opcode::LessThan,
        BinaryOperator::LessThanEqual => Opcode::LessThanEqual,
        BinaryOperator::GreaterThan => Opcode::GreaterThan,
        BinaryOperator::GreaterThanEqual => Opcode::GreaterThanEqual,
        BinaryOperator::BitwiseAnd => Opcode::BitAnd,
        BinaryOperator::BitwiseOr => Opcode::BitOr,
        BinaryOperator::BitwiseXor => Opcode::BitXor,
        BinaryOperator::LeftShift => Opcode::ShiftLeft,
        BinaryOperator::RightShift => Opcode::ShiftRight,
        BinaryOperator::UnsignedRightShift => Opcode::UnsignedShiftRight,
        BinaryOperator::Instanceof => Opcode::Instanceof,
        BinaryOperator::In => Opcode::In,
    }
}
