//! Abstract syntax tree for scripts and modules.

use core_types::SourcePosition;

/// A parsed script or module body.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Top-level statements
    pub body: Vec<Statement>,
}

/// A name with the position it appears at.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    /// The name
    pub name: String,
    /// Where it appears
    pub position: SourcePosition,
}

/// Statements and declarations.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `var`, `let` or `const`
    VariableDeclaration {
        /// Declaration kind
        kind: VariableKind,
        /// Declarators
        declarations: Vec<VariableDeclarator>,
        /// Source location
        position: SourcePosition,
    },

    /// `function name() {}`
    FunctionDeclaration {
        /// The function; always named
        function: Box<Function>,
        /// Source location
        position: SourcePosition,
    },

    /// `class Name {}`
    ClassDeclaration {
        /// The class; always named
        class: Box<Class>,
        /// Source location
        position: SourcePosition,
    },

    /// Expression evaluated for effect
    ExpressionStatement {
        /// The expression
        expression: Expression,
        /// Source location
        position: SourcePosition,
    },

    /// `return`
    ReturnStatement {
        /// Returned value
        argument: Option<Expression>,
        /// Source location
        position: SourcePosition,
    },

    /// `if`
    IfStatement {
        /// Condition
        test: Expression,
        /// Taken branch
        consequent: Box<Statement>,
        /// `else` branch
        alternate: Option<Box<Statement>>,
        /// Source location
        position: SourcePosition,
    },

    /// `while`
    WhileStatement {
        /// Condition
        test: Expression,
        /// Body
        body: Box<Statement>,
        /// Source location
        position: SourcePosition,
    },

    /// `do ... while`
    DoWhileStatement {
        /// Body
        body: Box<Statement>,
        /// Condition
        test: Expression,
        /// Source location
        position: SourcePosition,
    },

    /// `for (init; test; update)`
    ForStatement {
        /// Initializer
        init: Option<ForInit>,
        /// Condition
        test: Option<Expression>,
        /// Update
        update: Option<Expression>,
        /// Body
        body: Box<Statement>,
        /// Source location
        position: SourcePosition,
    },

    /// `for (left in right)`
    ForInStatement {
        /// Binding or target
        left: ForInOfLeft,
        /// Object whose keys are visited
        right: Expression,
        /// Body
        body: Box<Statement>,
        /// Source location
        position: SourcePosition,
    },

    /// `for (left of right)` and `for await`
    ForOfStatement {
        /// Binding or target
        left: ForInOfLeft,
        /// Iterable
        right: Expression,
        /// Body
        body: Box<Statement>,
        /// `for await`
        is_await: bool,
        /// Source location
        position: SourcePosition,
    },

    /// `{ ... }`
    BlockStatement {
        /// Statements
        body: Vec<Statement>,
        /// Source location
        position: SourcePosition,
    },

    /// `;`
    EmptyStatement {
        /// Source location
        position: SourcePosition,
    },

    /// `break`
    BreakStatement {
        /// Target label
        label: Option<String>,
        /// Source location
        position: SourcePosition,
    },

    /// `continue`
    ContinueStatement {
        /// Target label
        label: Option<String>,
        /// Source location
        position: SourcePosition,
    },

    /// `throw`
    ThrowStatement {
        /// Thrown value
        argument: Expression,
        /// Source location
        position: SourcePosition,
    },

    /// `try`
    TryStatement {
        /// Protected block
        block: Vec<Statement>,
        /// `catch`
        handler: Option<CatchClause>,
        /// `finally`
        finalizer: Option<Vec<Statement>>,
        /// Source location
        position: SourcePosition,
    },

    /// `switch`
    SwitchStatement {
        /// Value compared against each case
        discriminant: Expression,
        /// Cases in source order
        cases: Vec<SwitchCase>,
        /// Source location
        position: SourcePosition,
    },

    /// `label: statement`
    LabeledStatement {
        /// Label
        label: String,
        /// Labelled statement
        body: Box<Statement>,
        /// Source location
        position: SourcePosition,
    },

    /// `debugger`
    DebuggerStatement {
        /// Source location
        position: SourcePosition,
    },

    /// Module `import` declaration
    ImportDeclaration {
        /// Bindings introduced
        specifiers: Vec<ImportSpecifier>,
        /// Module specifier
        source: String,
        /// Source location
        position: SourcePosition,
    },

    /// Module `export` declaration
    ExportDeclaration {
        /// What is exported
        export: Export,
        /// Source location
        position: SourcePosition,
    },
}

impl Statement {
    /// Where the statement starts.
    pub fn position(&self) -> SourcePosition {
        match self {
            Statement::VariableDeclaration { position, .. }
            | Statement::FunctionDeclaration { position, .. }
            | Statement::ClassDeclaration { position, .. }
            | Statement::ExpressionStatement { position, .. }
            | Statement::ReturnStatement { position, .. }
            | Statement::IfStatement { position, .. }
            | Statement::WhileStatement { position, .. }
            | Statement::DoWhileStatement { position, .. }
            | Statement::ForStatement { position, .. }
            | Statement::ForInStatement { position, .. }
            | Statement::ForOfStatement { position, .. }
            | Statement::BlockStatement { position, .. }
            | Statement::EmptyStatement { position }
            | Statement::BreakStatement { position, .. }
            | Statement::ContinueStatement { position, .. }
            | Statement::ThrowStatement { position, .. }
            | Statement::TryStatement { position, .. }
            | Statement::SwitchStatement { position, .. }
            | Statement::LabeledStatement { position, .. }
            | Statement::DebuggerStatement { position }
            | Statement::ImportDeclaration { position, .. }
            | Statement::ExportDeclaration { position, .. } => *position,
        }
    }
}

/// Declaration keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// `var`
    Var,
    /// `let`
    Let,
    /// `const`
    Const,
}

/// One `target = init` in a declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclarator {
    /// Bound name or pattern
    pub id: Pattern,
    /// Initializer
    pub init: Option<Expression>,
}

/// First clause of a `for` statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    /// Declaration
    VariableDeclaration {
        /// Declaration kind
        kind: VariableKind,
        /// Declarators
        declarations: Vec<VariableDeclarator>,
    },
    /// Expression
    Expression(Expression),
}

/// Left side of `for-in` and `for-of`.
#[derive(Debug, Clone, PartialEq)]
pub enum ForInOfLeft {
    /// Fresh binding
    VariableDeclaration {
        /// Declaration kind
        kind: VariableKind,
        /// Bound pattern
        pattern: Pattern,
    },
    /// Existing target
    Pattern(Pattern),
}

/// `catch (param) { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    /// Binding for the exception
    pub param: Option<Pattern>,
    /// Handler body
    pub body: Vec<Statement>,
}

/// `case test:` or `default:`
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// None for `default`
    pub test: Option<Expression>,
    /// Statements up to the next case
    pub consequent: Vec<Statement>,
}

/// A binding introduced by `import`.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportSpecifier {
    /// `import name from`
    Default(Identifier),
    /// `import * as name from`
    Namespace(Identifier),
    /// `import { imported as local } from`
    Named {
        /// Exported name in the other module
        imported: String,
        /// Local binding
        local: Identifier,
    },
}

/// `local as exported` in an export list.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSpecifier {
    /// Local name, or the name in the source module for re-exports
    pub local: String,
    /// Exported name
    pub exported: String,
}

/// Forms of `export`.
#[derive(Debug, Clone, PartialEq)]
pub enum Export {
    /// `export { a, b as c }`, optionally `from 'module'`
    Named {
        /// Specifiers
        specifiers: Vec<ExportSpecifier>,
        /// Re-export source
        source: Option<String>,
    },
    /// `export * from 'module'` or `export * as name from 'module'`
    All {
        /// Namespace name
        alias: Option<String>,
        /// Source module
        source: String,
    },
    /// `export var|let|const|function|class`
    Declaration(Box<Statement>),
    /// `export default function|class`, possibly anonymous
    DefaultFunction(Box<Function>),
    /// `export default class`
    DefaultClass(Box<Class>),
    /// `export default expression`
    DefaultExpression(Expression),
}

/// Function of any form: declaration, expression, arrow or method.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Name, when it has one
    pub name: Option<Identifier>,
    /// Parameters, rest excluded
    pub params: Vec<Pattern>,
    /// Rest parameter
    pub rest: Option<Pattern>,
    /// Body
    pub body: FunctionBody,
    /// `async`
    pub is_async: bool,
    /// Generator
    pub is_generator: bool,
    /// Arrow function
    pub is_arrow: bool,
    /// Source location
    pub position: SourcePosition,
}

/// Block body or concise arrow body.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    /// `{ ... }`
    Block(Vec<Statement>),
    /// `=> expression`
    Expression(Box<Expression>),
}

/// Class of either form.
#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    /// Name, when it has one
    pub name: Option<Identifier>,
    /// `extends` clause
    pub super_class: Option<Box<Expression>>,
    /// Explicit constructor
    pub constructor: Option<Box<Function>>,
    /// Methods, fields and static blocks in source order
    pub members: Vec<ClassMember>,
    /// Source location
    pub position: SourcePosition,
}

/// One class body element.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassMember {
    /// Method or accessor
    Method {
        /// Key
        key: PropertyKey,
        /// Method, getter or setter
        kind: AccessorKind,
        /// Defined on the constructor instead of the prototype
        is_static: bool,
        /// Body
        function: Box<Function>,
    },
    /// Field with optional initializer
    Field {
        /// Key
        key: PropertyKey,
        /// Defined on the constructor instead of each instance
        is_static: bool,
        /// Initializer
        value: Option<Expression>,
    },
    /// `static { ... }`
    StaticBlock {
        /// Block body
        body: Vec<Statement>,
        /// Source location
        position: SourcePosition,
    },
}

/// Method, getter or setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    /// Plain method
    Method,
    /// `get`
    Getter,
    /// `set`
    Setter,
}

/// Property name in literals, classes and patterns.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    /// Identifier, keyword, string or number key, as its string value
    Named(String),
    /// `#name`, kept with its `#`
    Private(String),
    /// `[expression]`
    Computed(Box<Expression>),
}

/// Expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Name reference
    Identifier(Identifier),

    /// Literal value
    Literal {
        /// Value
        value: Literal,
        /// Source location
        position: SourcePosition,
    },

    /// Untagged template
    TemplateLiteral {
        /// Cooked strings between substitutions
        quasis: Vec<String>,
        /// Substitutions
        expressions: Vec<Expression>,
        /// Source location
        position: SourcePosition,
    },

    /// `` tag`...` ``
    TaggedTemplate {
        /// Tag function
        tag: Box<Expression>,
        /// Cooked strings; None where an escape is invalid
        quasis: Vec<Option<String>>,
        /// Raw strings
        raw: Vec<String>,
        /// Substitutions
        expressions: Vec<Expression>,
        /// Source location
        position: SourcePosition,
    },

    /// `/pattern/flags`
    RegExp {
        /// Pattern text
        pattern: String,
        /// Flags
        flags: String,
        /// Source location
        position: SourcePosition,
    },

    /// `[a, , ...b]`
    Array {
        /// Elements
        elements: Vec<ArrayElement>,
        /// Source location
        position: SourcePosition,
    },

    /// `{ ... }`
    Object {
        /// Properties
        properties: Vec<ObjectProperty>,
        /// Source location
        position: SourcePosition,
    },

    /// Function or arrow function expression
    Function(Box<Function>),

    /// Class expression
    Class(Box<Class>),

    /// Prefix operator
    Unary {
        /// Operator
        operator: UnaryOperator,
        /// Operand
        argument: Box<Expression>,
        /// Source location
        position: SourcePosition,
    },

    /// `++` or `--`
    Update {
        /// Operator
        operator: UpdateOperator,
        /// Prefix form
        prefix: bool,
        /// Target
        argument: Box<Expression>,
        /// Source location
        position: SourcePosition,
    },

    /// Arithmetic, bitwise, relational and equality operators
    Binary {
        /// Operator
        operator: BinaryOperator,
        /// Left operand
        left: Box<Expression>,
        /// Right operand
        right: Box<Expression>,
        /// Source location
        position: SourcePosition,
    },

    /// `&&`, `||` and `??`
    Logical {
        /// Operator
        operator: LogicalOperator,
        /// Left operand
        left: Box<Expression>,
        /// Right operand
        right: Box<Expression>,
        /// Source location
        position: SourcePosition,
    },

    /// Assignment of any operator
    Assignment {
        /// Operator
        operator: AssignmentOperator,
        /// Target; only `=` takes a destructuring pattern
        target: Box<Pattern>,
        /// Assigned value
        value: Box<Expression>,
        /// Source location
        position: SourcePosition,
    },

    /// `test ? consequent : alternate`
    Conditional {
        /// Condition
        test: Box<Expression>,
        /// Value when truthy
        consequent: Box<Expression>,
        /// Value when falsy
        alternate: Box<Expression>,
        /// Source location
        position: SourcePosition,
    },

    /// Call
    Call {
        /// Callee
        callee: Box<Expression>,
        /// Arguments
        arguments: Vec<ArrayElement>,
        /// `callee?.()`
        optional: bool,
        /// Source location
        position: SourcePosition,
    },

    /// `new callee(arguments)`
    New {
        /// Constructor
        callee: Box<Expression>,
        /// Arguments
        arguments: Vec<ArrayElement>,
        /// Source location
        position: SourcePosition,
    },

    /// `object.name`, `object[expr]` and their `?.` forms
    Member {
        /// Object
        object: Box<Expression>,
        /// Property
        property: PropertyKey,
        /// `object?.property`
        optional: bool,
        /// Source location
        position: SourcePosition,
    },

    /// Extent of an optional chain; short-circuits to undefined
    OptionalChain {
        /// Chain
        expression: Box<Expression>,
        /// Source location
        position: SourcePosition,
    },

    /// Comma operator
    Sequence {
        /// Operands
        expressions: Vec<Expression>,
        /// Source location
        position: SourcePosition,
    },

    /// `this`
    This {
        /// Source location
        position: SourcePosition,
    },

    /// `super` as the object of a member or the callee of a call
    Super {
        /// Source location
        position: SourcePosition,
    },

    /// `new.target`
    NewTarget {
        /// Source location
        position: SourcePosition,
    },

    /// `import.meta`
    ImportMeta {
        /// Source location
        position: SourcePosition,
    },

    /// `import(specifier)`
    ImportCall {
        /// Specifier
        source: Box<Expression>,
        /// Source location
        position: SourcePosition,
    },

    /// `await`
    Await {
        /// Awaited value
        argument: Box<Expression>,
        /// Source location
        position: SourcePosition,
    },

    /// `yield` and `yield*`
    Yield {
        /// Yielded value
        argument: Option<Box<Expression>>,
        /// `yield*`
        delegate: bool,
        /// Source location
        position: SourcePosition,
    },
}

impl Expression {
    /// Where the expression starts.
    pub fn position(&self) -> SourcePosition {
        match self {
            Expression::Identifier(id) => id.position,
            Expression::Function(function) => function.position,
            Expression::Class(class) => class.position,
            Expression::Literal { position, .. }
            | Expression::TemplateLiteral { position, .. }
            | Expression::TaggedTemplate { position, .. }
            | Expression::RegExp { position, .. }
            | Expression::Array { position, .. }
            | Expression::Object { position, .. }
            | Expression::Unary { position, .. }
            | Expression::Update { position, .. }
            | Expression::Binary { position, .. }
            | Expression::Logical { position, .. }
            | Expression::Assignment { position, .. }
            | Expression::Conditional { position, .. }
            | Expression::Call { position, .. }
            | Expression::New { position, .. }
            | Expression::Member { position, .. }
            | Expression::OptionalChain { position, .. }
            | Expression::Sequence { position, .. }
            | Expression::This { position }
            | Expression::Super { position }
            | Expression::NewTarget { position }
            | Expression::ImportMeta { position }
            | Expression::ImportCall { position, .. }
            | Expression::Await { position, .. }
            | Expression::Yield { position, .. } => *position,
        }
    }
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Number
    Number(f64),
    /// BigInt digits
    BigInt(String),
    /// String
    String(String),
    /// `true` or `false`
    Boolean(bool),
    /// `null`
    Null,
}

/// Array literal element or call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayElement {
    /// Plain value
    Expression(Expression),
    /// `...value`
    Spread(Expression),
    /// Elision; array literals only
    Hole,
}

/// Object literal member.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectProperty {
    /// `key: value` and shorthand `key`
    Property {
        /// Key
        key: PropertyKey,
        /// Value
        value: Expression,
    },
    /// Method or accessor
    Method {
        /// Key
        key: PropertyKey,
        /// Method, getter or setter
        kind: AccessorKind,
        /// Body
        function: Box<Function>,
    },
    /// `...source`
    Spread(Expression),
    /// `name = default`; only valid once the literal becomes a pattern
    CoverInitializedName {
        /// Name
        name: Identifier,
        /// Default
        default: Expression,
    },
}

/// Binding and assignment targets.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Name
    Identifier(Identifier),
    /// `{ a, b: c, ...rest }`
    Object {
        /// Properties
        properties: Vec<ObjectPatternProperty>,
        /// Rest target
        rest: Option<Box<Pattern>>,
    },
    /// `[a, , b, ...rest]`
    Array {
        /// Elements; None for holes
        elements: Vec<Option<Pattern>>,
        /// Rest target
        rest: Option<Box<Pattern>>,
    },
    /// `target = default`
    Assignment {
        /// Target
        target: Box<Pattern>,
        /// Used when the value is undefined
        default: Box<Expression>,
    },
    /// Member expression target; assignments only
    Expression(Box<Expression>),
}

/// `key: pattern` inside an object pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPatternProperty {
    /// Key
    pub key: PropertyKey,
    /// Target
    pub value: Pattern,
}

impl Pattern {
    /// Names bound by the pattern, in source order.
    pub fn bound_names(&self) -> Vec<&Identifier> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a Identifier>) {
        match self {
            Pattern::Identifier(id) => names.push(id),
            Pattern::Object { properties, rest } => {
                for property in properties {
                    property.value.collect_names(names);
                }
                if let Some(rest) = rest {
                    rest.collect_names(names);
                }
            }
            Pattern::Array { elements, rest } => {
                for element in elements.iter().flatten() {
                    element.collect_names(names);
                }
                if let Some(rest) = rest {
                    rest.collect_names(names);
                }
            }
            Pattern::Assignment { target, .. } => target.collect_names(names),
            Pattern::Expression(_) => {}
        }
    }
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// `-`
    Minus,
    /// `+`
    Plus,
    /// `!`
    Not,
    /// `~`
    BitwiseNot,
    /// `typeof`
    Typeof,
    /// `void`
    Void,
    /// `delete`
    Delete,
}

/// `++` or `--`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    /// `++`
    Increment,
    /// `--`
    Decrement,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `**`
    Exp,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `===`
    StrictEqual,
    /// `!==`
    StrictNotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEqual,
    /// `&`
    BitwiseAnd,
    /// `|`
    BitwiseOr,
    /// `^`
    BitwiseXor,
    /// `<<`
    LeftShift,
    /// `>>`
    RightShift,
    /// `>>>`
    UnsignedRightShift,
    /// `instanceof`
    Instanceof,
    /// `in`
    In,
}

/// Short-circuit operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `??`
    NullishCoalescing,
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOperator {
    /// `=`
    Assign,
    /// Compound arithmetic or bitwise assignment
    Compound(BinaryOperator),
    /// `&&=`, `||=` and `??=`
    Logical(LogicalOperator),
}
