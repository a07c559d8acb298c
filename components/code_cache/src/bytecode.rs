//! Bytecode chunks.
//!
//! A chunk is the compiled body of one function: instructions over an
//! operand stack, a constant pool, the number of local registers, and the
//! chunks of the functions nested inside it. Chunks serialize to a compact
//! binary form:
//!
//! ```text
//! magic "BCNK" | version u8 | chunk
//! chunk = name | params u32 | registers u32 | upvalues u32 | flags u8
//!         | constants | instructions | nested chunks
//! ```
//!
//! All integers are little-endian; strings and lists carry a u32 length.

use core_types::SourcePosition;
use thiserror::Error;

/// Chunk magic.
pub const CHUNK_MAGIC: [u8; 4] = *b"BCNK";

/// Chunk format version.
pub const CHUNK_VERSION: u8 = 2;

/// Deepest function nesting a serialized chunk may have.
pub const MAX_FUNCTION_NESTING: usize = 256;

/// Local variable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterId(pub u32);

/// Where a closure finds a captured variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UpvalueDescriptor {
    /// True for a register of the enclosing function, false for one of its upvalues
    pub is_local: bool,
    /// Register or upvalue index
    pub index: u32,
}

impl UpvalueDescriptor {
    /// Create a descriptor.
    pub fn new(is_local: bool, index: u32) -> Self {
        Self { is_local, index }
    }
}

/// Form of a method definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// Plain method
    Method,
    /// `get` accessor
    Getter,
    /// `set` accessor
    Setter,
}

/// Constant pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Number literal
    Number(f64),
    /// String literal, property key or regular expression part
    String(String),
    /// BigInt literal digits, radix prefix kept
    BigInt(String),
}

impl Constant {
    fn same(&self, other: &Constant) -> bool {
        match (self, other) {
            (Constant::Number(a), Constant::Number(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

/// Stack machine instruction set.
///
/// Stores leave the stored value on the stack. Conditional jumps pop the
/// value they test. Jump operands are absolute instruction indexes.
#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    // Loads
    /// Push constant
    LoadConstant(u32),
    /// Push undefined
    LoadUndefined,
    /// Push null
    LoadNull,
    /// Push true
    LoadTrue,
    /// Push false
    LoadFalse,
    /// Push the receiver
    LoadThis,
    /// Push `new.target`
    LoadNewTarget,
    /// Push `import.meta`
    LoadImportMeta,
    /// Push the arguments object
    LoadArguments,
    /// Push an array of the arguments from the given index on
    LoadRestArguments(u32),

    // Variables
    /// Push global by name
    LoadGlobal(String),
    /// Store to global
    StoreGlobal(String),
    /// `typeof` of a global that may not exist
    TypeofGlobal(String),
    /// `delete` of a global binding
    DeleteGlobal(String),
    /// Push register
    LoadLocal(RegisterId),
    /// Store to register
    StoreLocal(RegisterId),
    /// Push captured variable
    LoadUpvalue(u32),
    /// Store to captured variable
    StoreUpvalue(u32),

    // Arithmetic
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
    /// Unary `-`
    Neg,
    /// Unary `+`
    ToNumber,
    /// Number or BigInt conversion for update expressions
    ToNumeric,
    /// String conversion for template substitutions
    ToString,
    /// Add one
    Increment,
    /// Subtract one
    Decrement,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `~`
    BitNot,
    /// `<<`
    ShiftLeft,
    /// `>>`
    ShiftRight,
    /// `>>>`
    UnsignedShiftRight,
    /// `!`
    Not,
    /// `typeof`
    Typeof,
    /// `void`
    Void,

    // Comparison
    /// `==`
    Equal,
    /// `===`
    StrictEqual,
    /// `!=`
    NotEqual,
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
    /// `instanceof`
    Instanceof,
    /// `in`
    In,

    // Control flow
    /// Unconditional jump
    Jump(u32),
    /// Jump when truthy
    JumpIfTrue(u32),
    /// Jump when falsy
    JumpIfFalse(u32),
    /// Jump when null or undefined
    JumpIfNullish(u32),
    /// Jump unless null or undefined
    JumpIfNotNullish(u32),
    /// Jump unless undefined
    JumpIfNotUndefined(u32),
    /// Return top of stack
    Return,
    /// Throw top of stack
    Throw,
    /// Install a catch handler; the exception is pushed at the target
    PushTry(u32),
    /// Remove the innermost catch handler
    PopTry,
    /// Install a finally handler; the exception is pushed at the target
    PushFinally(u32),
    /// Remove the innermost finally handler
    PopFinally,

    // Stack
    /// Discard top
    Pop,
    /// Duplicate top
    Dup,
    /// Duplicate the top two
    Dup2,
    /// Exchange the top two
    Swap,
    /// Move top below the next two: `a b c` becomes `c a b`
    Rot3,

    // Objects and arrays
    /// Push an empty object
    CreateObject,
    /// `obj value` to `obj` with the named data property defined
    DefineField(String),
    /// `obj key value` to `obj`
    DefineComputedField,
    /// `obj fn` to `obj` with a method or accessor defined
    DefineMethod(String, MethodKind),
    /// `obj key fn` to `obj`
    DefineComputedMethod(MethodKind),
    /// `obj source` to `obj` with own enumerable properties copied
    CopyDataProperties,
    /// `source` to `source rest`, leaving out the named keys
    ObjectRest(Vec<String>),
    /// Push an empty array
    CreateArray,
    /// `arr value` to `arr`
    ArrayPush,
    /// `arr` to `arr` with a hole appended
    ArrayHole,
    /// `arr iterable` to `arr` with every item appended
    ArraySpread,
    /// `obj` to `obj.name`
    LoadProperty(String),
    /// `obj value` to `value`
    StoreProperty(String),
    /// `obj key` to `obj[key]`
    GetIndex,
    /// `obj key value` to `value`
    SetIndex,
    /// `obj` to the result of deleting `obj.name`
    DeleteProperty(String),
    /// `obj key` to the result of deleting `obj[key]`
    DeleteIndex,
    /// Push `super.name`
    LoadSuperProperty(String),
    /// `key` to `super[key]`
    LoadSuperIndex,

    // Calls
    /// `fn args..` to result
    Call(u8),
    /// `this fn args..` to result
    CallMethod(u8),
    /// `fn args..` to the constructed object
    CallNew(u8),
    /// `fn arr` to result
    CallWithArray,
    /// `this fn arr` to result
    CallMethodWithArray,
    /// `fn arr` to the constructed object
    CallNewWithArray,
    /// `args..` to `this` after the parent constructor ran
    SuperCall(u8),
    /// `arr` to `this` after the parent constructor ran
    SuperCallWithArray,

    // Functions and classes
    /// Push a closure over nested function `index`
    CreateClosure(u32, Vec<UpvalueDescriptor>),
    /// `[parent] ctor` to the class; the flag says whether a parent is on the stack
    CreateClass(String, bool),
    /// `class fn` to `class`; the flag selects the constructor over the prototype
    DefineClassMethod(String, MethodKind, bool),
    /// `class key fn` to `class`
    DefineComputedClassMethod(MethodKind, bool),

    // Iteration
    /// `iterable` to its iterator
    GetIterator,
    /// `iterable` to its async iterator
    GetAsyncIterator,
    /// `obj` to an iterator over its enumerable keys
    GetPropertyIterator,
    /// `iter` to `iter value`, or jump with `iter` when done
    IteratorNext(u32),
    /// `iter` to `iter value`, pushing undefined when done
    IteratorValue,
    /// `iter` to `iter arr` holding what is left
    IteratorRest,
    /// Pop the iterator, closing it unless exhausted
    IteratorClose,

    // Suspension and misc
    /// Await top of stack
    Await,
    /// Yield top of stack; push the value sent back
    Yield,
    /// `yield*` over top of stack
    YieldDelegate,
    /// Push a regular expression from pattern and flags constants
    CreateRegExp(u32, u32),
    /// `specifier` to the promise of `import()`
    ImportCall,
    /// `debugger`
    Debugger,
}

/// One instruction with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Operation
    pub opcode: Opcode,
    /// Where it came from
    pub source_position: Option<SourcePosition>,
}

impl Instruction {
    /// Instruction without a position.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            source_position: None,
        }
    }

    /// Instruction at `position`.
    pub fn with_position(opcode: Opcode, position: SourcePosition) -> Self {
        Self {
            opcode,
            source_position: Some(position),
        }
    }
}

/// How a function behaves when called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FunctionFlags {
    /// `async`
    pub is_async: bool,
    /// Generator
    pub is_generator: bool,
    /// Arrow function; `this` is lexical
    pub is_arrow: bool,
    /// Class constructor; returns `this`
    pub is_class_constructor: bool,
    /// Constructor of a class with `extends`
    pub is_derived: bool,
}

impl FunctionFlags {
    fn bits(&self) -> u8 {
        [
            self.is_async,
            self.is_generator,
            self.is_arrow,
            self.is_class_constructor,
            self.is_derived,
        ]
        .iter()
        .enumerate()
        .fold(0, |acc, (i, set)| if *set { acc | (1 << i) } else { acc })
    }

    fn from_bits(bits: u8) -> Option<Self> {
        if bits >> 5 != 0 {
            return None;
        }
        Some(Self {
            is_async: bits & 1 != 0,
            is_generator: bits & 2 != 0,
            is_arrow: bits & 4 != 0,
            is_class_constructor: bits & 8 != 0,
            is_derived: bits & 16 != 0,
        })
    }
}

/// Why chunk bytes could not be used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// Input ended inside a field
    #[error("chunk data ends early at byte {0}")]
    Truncated(usize),

    /// Not a chunk
    #[error("chunk has a bad magic number")]
    BadMagic,

    /// Written by another format version
    #[error("chunk format version {0} is not supported")]
    UnsupportedVersion(u8),

    /// Unknown opcode, constant or flag encoding
    #[error("unknown {what} tag {tag}")]
    UnknownTag {
        /// Field being decoded
        what: &'static str,
        /// Offending byte
        tag: u8,
    },

    /// A string field is not UTF-8
    #[error("chunk string is not valid UTF-8")]
    InvalidString,

    /// Functions nest too deeply
    #[error("functions nest deeper than {0}")]
    TooDeep(usize),

    /// Bytes left after the chunk
    #[error("{0} trailing bytes after chunk")]
    TrailingBytes(usize),

    /// Decodes, but an operand points outside the chunk
    #[error("chunk is inconsistent: {0}")]
    Inconsistent(String),
}

/// Compiled function body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BytecodeChunk {
    /// Function name, if it has one
    pub name: Option<String>,
    /// Declared parameter count, rest parameter excluded
    pub param_count: u32,
    /// Registers needed, parameters included
    pub register_count: u32,
    /// Captured variables the closure carries
    pub upvalue_count: u32,
    /// Calling behaviour
    pub flags: FunctionFlags,
    /// Instructions
    pub instructions: Vec<Instruction>,
    /// Constant pool
    pub constants: Vec<Constant>,
    /// Chunks for `CreateClosure`
    pub nested_functions: Vec<BytecodeChunk>,
}

impl BytecodeChunk {
    /// Empty chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction and return its index.
    pub fn emit(&mut self, opcode: Opcode) -> usize {
        self.instructions.push(Instruction::new(opcode));
        self.instructions.len() - 1
    }

    /// Append an instruction at `position` and return its index.
    pub fn emit_with_position(&mut self, opcode: Opcode, position: SourcePosition) -> usize {
        self.instructions
            .push(Instruction::with_position(opcode, position));
        self.instructions.len() - 1
    }

    /// Index of `value` in the pool, adding it if new.
    pub fn add_constant(&mut self, value: Constant) -> u32 {
        if let Some(index) = self.constants.iter().position(|c| c.same(&value)) {
            return index as u32;
        }
        self.constants.push(value);
        (self.constants.len() - 1) as u32
    }

    /// Add a nested function and return its index.
    pub fn add_nested_function(&mut self, chunk: BytecodeChunk) -> u32 {
        self.nested_functions.push(chunk);
        (self.nested_functions.len() - 1) as u32
    }

    /// Point the jump at `index` to `target`.
    pub fn patch_jump(&mut self, index: usize, target: usize) {
        let Some(instruction) = self.instructions.get_mut(index) else {
            return;
        };
        match &mut instruction.opcode {
            Opcode::Jump(t)
            | Opcode::JumpIfTrue(t)
            | Opcode::JumpIfFalse(t)
            | Opcode::JumpIfNullish(t)
            | Opcode::JumpIfNotNullish(t)
            | Opcode::JumpIfNotUndefined(t)
            | Opcode::PushTry(t)
            | Opcode::PushFinally(t)
            | Opcode::IteratorNext(t) => *t = target as u32,
            _ => {}
        }
    }

    /// Number of instructions.
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Number of constants.
    pub fn constant_count(&self) -> usize {
        self.constants.len()
    }

    /// Nested function chunks.
    pub fn nested_functions(&self) -> &[BytecodeChunk] {
        &self.nested_functions
    }

    /// Serialize with magic and version.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&CHUNK_MAGIC);
        out.push(CHUNK_VERSION);
        self.write(&mut out);
        out
    }

    /// Deserialize bytes written by [`BytecodeChunk::to_bytes`] and check
    /// that every operand stays inside the chunk.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChunkError> {
        let mut reader = ByteReader::new(bytes);
        if reader.take(4)? != CHUNK_MAGIC {
            return Err(ChunkError::BadMagic);
        }
        let version = reader.u8()?;
        if version != CHUNK_VERSION {
            return Err(ChunkError::UnsupportedVersion(version));
        }
        let chunk = Self::read(&mut reader, 0)?;
        if reader.remaining() > 0 {
            return Err(ChunkError::TrailingBytes(reader.remaining()));
        }
        chunk.check_consistency()?;
        Ok(chunk)
    }

    /// Check constant, register, jump and closure operands.
    pub fn check_consistency(&self) -> Result<(), ChunkError> {
        self.check(0)
    }

    fn check(&self, depth: usize) -> Result<(), ChunkError> {
        if depth > MAX_FUNCTION_NESTING {
            return Err(ChunkError::TooDeep(MAX_FUNCTION_NESTING));
        }
        let inconsistent = |index: usize, what: &str| {
            Err(ChunkError::Inconsistent(format!(
                "instruction {} has a bad {}",
                index, what
            )))
        };
        if self.param_count > self.register_count {
            return Err(ChunkError::Inconsistent(
                "more parameters than registers".to_string(),
            ));
        }
        let end = self.instructions.len() as u32;
        let constants = self.constants.len() as u32;
        for (index, instruction) in self.instructions.iter().enumerate() {
            match &instruction.opcode {
                Opcode::LoadConstant(c) if *c >= constants => return inconsistent(index, "constant"),
                Opcode::CreateRegExp(p, f) if *p >= constants || *f >= constants => {
                    return inconsistent(index, "constant")
                }
                Opcode::LoadLocal(r) | Opcode::StoreLocal(r) if r.0 >= self.register_count => {
                    return inconsistent(index, "register")
                }
                Opcode::LoadUpvalue(u) | Opcode::StoreUpvalue(u) if *u >= self.upvalue_count => {
                    return inconsistent(index, "upvalue")
                }
                Opcode::Jump(t)
                | Opcode::JumpIfTrue(t)
                | Opcode::JumpIfFalse(t)
                | Opcode::JumpIfNullish(t)
                | Opcode::JumpIfNotNullish(t)
                | Opcode::JumpIfNotUndefined(t)
                | Opcode::PushTry(t)
                | Opcode::PushFinally(t)
                | Opcode::IteratorNext(t)
                    if *t > end =>
                {
                    return inconsistent(index, "jump target")
                }
                Opcode::CreateClosure(f, upvalues) => {
                    let Some(nested) = self.nested_functions.get(*f as usize) else {
                        return inconsistent(index, "function");
                    };
                    if nested.upvalue_count as usize != upvalues.len() {
                        return inconsistent(index, "upvalue list");
                    }
                    let captured_ok = upvalues.iter().all(|u| {
                        if u.is_local {
                            u.index < self.register_count
                        } else {
                            u.index < self.upvalue_count
                        }
                    });
                    if !captured_ok {
                        return inconsistent(index, "upvalue");
                    }
                }
                _ => {}
            }
        }
        self.nested_functions
            .iter()
            .try_for_each(|nested| nested.check(depth + 1))
    }

    fn write(&self, out: &mut Vec<u8>) {
        match &self.name {
            Some(name) => {
                out.push(1);
                put_str(out, name);
            }
            None => out.push(0),
        }
        put_u32(out, self.param_count);
        put_u32(out, self.register_count);
        put_u32(out, self.upvalue_count);
        out.push(self.flags.bits());

        put_u32(out, self.constants.len() as u32);
        for constant in &self.constants {
            match constant {
                Constant::Number(n) => {
                    out.push(0);
                    out.extend_from_slice(&n.to_bits().to_le_bytes());
                }
                Constant::String(s) => {
                    out.push(1);
                    put_str(out, s);
                }
                Constant::BigInt(s) => {
                    out.push(2);
                    put_str(out, s);
                }
            }
        }

        put_u32(out, self.instructions.len() as u32);
        for instruction in &self.instructions {
            write_opcode(out, &instruction.opcode);
            match &instruction.source_position {
                Some(position) => {
                    out.push(1);
                    put_u32(out, position.line);
                    put_u32(out, position.column);
                    out.extend_from_slice(&(position.offset as u64).to_le_bytes());
                }
                None => out.push(0),
            }
        }

        put_u32(out, self.nested_functions.len() as u32);
        for nested in &self.nested_functions {
            nested.write(out);
        }
    }

    fn read(reader: &mut ByteReader<'_>, depth: usize) -> Result<Self, ChunkError> {
        if depth > MAX_FUNCTION_NESTING {
            return Err(ChunkError::TooDeep(MAX_FUNCTION_NESTING));
        }
        let name = match reader.u8()? {
            0 => None,
            1 => Some(reader.string()?),
            tag => return Err(ChunkError::UnknownTag { what: "name", tag }),
        };
        let param_count = reader.u32()?;
        let register_count = reader.u32()?;
        let upvalue_count = reader.u32()?;
        let bits = reader.u8()?;
        let flags = FunctionFlags::from_bits(bits)
            .ok_or(ChunkError::UnknownTag { what: "flags", tag: bits })?;

        let count = reader.count()?;
        let mut constants = Vec::with_capacity(count);
        for _ in 0..count {
            let constant = match reader.u8()? {
                0 => Constant::Number(f64::from_bits(reader.u64()?)),
                1 => Constant::String(reader.string()?),
                2 => Constant::BigInt(reader.string()?),
                tag => return Err(ChunkError::UnknownTag { what: "constant", tag }),
            };
            constants.push(constant);
        }

        let count = reader.count()?;
        let mut instructions = Vec::with_capacity(count);
        for _ in 0..count {
            let opcode = read_opcode(reader)?;
            let source_position = match reader.u8()? {
                0 => None,
                1 => Some(SourcePosition {
                    line: reader.u32()?,
                    column: reader.u32()?,
                    offset: reader.u64()? as usize,
                }),
                tag => return Err(ChunkError::UnknownTag { what: "position", tag }),
            };
            instructions.push(Instruction {
                opcode,
                source_position,
            });
        }

        let count = reader.count()?;
        let mut nested_functions = Vec::with_capacity(count);
        for _ in 0..count {
            nested_functions.push(Self::read(reader, depth + 1)?);
        }

        Ok(Self {
            name,
            param_count,
            register_count,
            upvalue_count,
            flags,
            instructions,
            constants,
            nested_functions,
        })
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, value: &str) {
    put_u32(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

fn method_tag(kind: MethodKind) -> u8 {
    match kind {
        MethodKind::Method => 0,
        MethodKind::Getter => 1,
        MethodKind::Setter => 2,
    }
}

fn write_opcode(out: &mut Vec<u8>, opcode: &Opcode) {
    use Opcode::*;
    let simple = |out: &mut Vec<u8>, tag: u8| out.push(tag);
    let with_u32 = |out: &mut Vec<u8>, tag: u8, value: u32| {
        out.push(tag);
        put_u32(out, value);
    };
    let with_str = |out: &mut Vec<u8>, tag: u8, value: &str| {
        out.push(tag);
        put_str(out, value);
    };
    match opcode {
        LoadConstant(c) => with_u32(out, 0, *c),
        LoadUndefined => simple(out, 1),
        LoadNull => simple(out, 2),
        LoadTrue => simple(out, 3),
        LoadFalse => simple(out, 4),
        LoadThis => simple(out, 5),
        LoadNewTarget => simple(out, 6),
        LoadImportMeta => simple(out, 7),
        LoadArguments => simple(out, 8),
        LoadRestArguments(from) => with_u32(out, 9, *from),
        LoadGlobal(name) => with_str(out, 10, name),
        StoreGlobal(name) => with_str(out, 11, name),
        TypeofGlobal(name) => with_str(out, 12, name),
        DeleteGlobal(name) => with_str(out, 13, name),
        LoadLocal(r) => with_u32(out, 14, r.0),
        StoreLocal(r) => with_u32(out, 15, r.0),
        LoadUpvalue(u) => with_u32(out, 16, *u),
        StoreUpvalue(u) => with_u32(out, 17, *u),
        Add => simple(out, 20),
        Sub => simple(out, 21),
        Mul => simple(out, 22),
        Div => simple(out, 23),
        Mod => simple(out, 24),
        Exp => simple(out, 25),
        Neg => simple(out, 26),
        ToNumber => simple(out, 27),
        ToNumeric => simple(out, 28),
        ToString => simple(out, 29),
        Increment => simple(out, 30),
        Decrement => simple(out, 31),
        BitAnd => simple(out, 32),
        BitOr => simple(out, 33),
        BitXor => simple(out, 34),
        BitNot => simple(out, 35),
        ShiftLeft => simple(out, 36),
        ShiftRight => simple(out, 37),
        UnsignedShiftRight => simple(out, 38),
        Not => simple(out, 39),
        Typeof => simple(out, 40),
        Void => simple(out, 41),
        Equal => simple(out, 42),
        StrictEqual => simple(out, 43),
        NotEqual => simple(out, 44),
        StrictNotEqual => simple(out, 45),
        LessThan => simple(out, 46),
        LessThanEqual => simple(out, 47),
        GreaterThan => simple(out, 48),
        GreaterThanEqual => simple(out, 49),
        Instanceof => simple(out, 50),
        In => simple(out, 51),
        Jump(t) => with_u32(out, 52, *t),
        JumpIfTrue(t) => with_u32(out, 53, *t),
        JumpIfFalse(t) => with_u32(out, 54, *t),
        JumpIfNullish(t) => with_u32(out, 55, *t),
        JumpIfNotNullish(t) => with_u32(out, 56, *t),
        JumpIfNotUndefined(t) => with_u32(out, 57, *t),
        Return => simple(out, 58),
        Throw => simple(out, 59),
        PushTry(t) => with_u32(out, 60, *t),
        PopTry => simple(out, 61),
        PushFinally(t) => with_u32(out, 62, *t),
        PopFinally => simple(out, 63),
        Pop => simple(out, 64),
        Dup => simple(out, 65),
        Dup2 => simple(out, 66),
        Swap => simple(out, 67),
        Rot3 => simple(out, 68),
        CreateObject => simple(out, 70),
        DefineField(name) => with_str(out, 71, name),
        DefineComputedField => simple(out, 72),
        DefineMethod(name, kind) => {
            with_str(out, 73, name);
            out.push(method_tag(*kind));
        }
        DefineComputedMethod(kind) => {
            out.push(74);
            out.push(method_tag(*kind));
        }
        CopyDataProperties => simple(out, 75),
        ObjectRest(keys) => {
            with_u32(out, 76, keys.len() as u32);
            for key in keys {
                put_str(out, key);
            }
        }
        CreateArray => simple(out, 77),
        ArrayPush => simple(out, 78),
        ArrayHole => simple(out, 79),
        ArraySpread => simple(out, 80),
        LoadProperty(name) => with_str(out, 81, name),
        StoreProperty(name) => with_str(out, 82, name),
        GetIndex => simple(out, 83),
        SetIndex => simple(out, 84),
        DeleteProperty(name) => with_str(out, 85, name),
        DeleteIndex => simple(out, 86),
        LoadSuperProperty(name) => with_str(out, 87, name),
        LoadSuperIndex => simple(out, 88),
        Call(argc) => out.extend_from_slice(&[90, *argc]),
        CallMethod(argc) => out.extend_from_slice(&[91, *argc]),
        CallNew(argc) => out.extend_from_slice(&[92, *argc]),
        CallWithArray => simple(out, 93),
        CallMethodWithArray => simple(out, 94),
        CallNewWithArray => simple(out, 95),
        SuperCall(argc) => out.extend_from_slice(&[96, *argc]),
        SuperCallWithArray => simple(out, 97),
        CreateClosure(index, upvalues) => {
            with_u32(out, 100, *index);
            put_u32(out, upvalues.len() as u32);
            for upvalue in upvalues {
                out.push(upvalue.is_local as u8);
                put_u32(out, upvalue.index);
            }
        }
        CreateClass(name, derived) => {
            with_str(out, 101, name);
            out.push(*derived as u8);
        }
        DefineClassMethod(name, kind, is_static) => {
            with_str(out, 102, name);
            out.push(method_tag(*kind));
            out.push(*is_static as u8);
        }
        DefineComputedClassMethod(kind, is_static) => {
            out.extend_from_slice(&[103, method_tag(*kind), *is_static as u8]);
        }
        GetIterator => simple(out, 105),
        GetAsyncIterator => simple(out, 106),
        GetPropertyIterator => simple(out, 107),
        IteratorNext(t) => with_u32(out, 108, *t),
        IteratorValue => simple(out, 109),
        IteratorRest => simple(out, 110),
        IteratorClose => simple(out, 111),
        Await => simple(out, 112),
        Yield => simple(out, 113),
        YieldDelegate => simple(out, 114),
        CreateRegExp(pattern, flags) => {
            with_u32(out, 115, *pattern);
            put_u32(out, *flags);
        }
        ImportCall => simple(out, 116),
        Debugger => simple(out, 117),
    }
}

fn read_opcode(reader: &mut ByteReader<'_>) -> Result<Opcode, ChunkError> {
    use Opcode::*;
    let tag = reader.u8()?;
    let opcode = match tag {
        0 => LoadConstant(reader.u32()?),
        1 => LoadUndefined,
        2 => LoadNull,
        3 => LoadTrue,
        4 => LoadFalse,
        5 => LoadThis,
        6 => LoadNewTarget,
        7 => LoadImportMeta,
        8 => LoadArguments,
        9 => LoadRestArguments(reader.u32()?),
        10 => LoadGlobal(reader.string()?),
        11 => StoreGlobal(reader.string()?),
        12 => TypeofGlobal(reader.string()?),
        13 => DeleteGlobal(reader.string()?),
        14 => LoadLocal(RegisterId(reader.u32()?)),
        15 => StoreLocal(RegisterId(reader.u32()?)),
        16 => LoadUpvalue(reader.u32()?),
        17 => StoreUpvalue(reader.u32()?),
        20 => Add,
        21 => Sub,
        22 => Mul,
        23 => Div,
        24 => Mod,
        25 => Exp,
        26 => Neg,
        27 => ToNumber,
        28 => ToNumeric,
        29 => ToString,
        30 => Increment,
        31 => Decrement,
        32 => BitAnd,
        33 => BitOr,
        34 => BitXor,
        35 => BitNot,
        36 => ShiftLeft,
        37 => ShiftRight,
        38 => UnsignedShiftRight,
        39 => Not,
        40 => Typeof,
        41 => Void,
        42 => Equal,
        43 => StrictEqual,
        44 => NotEqual,
        45 => StrictNotEqual,
        46 => LessThan,
        47 => LessThanEqual,
        48 => GreaterThan,
        49 => GreaterThanEqual,
        50 => Instanceof,
        51 => In,
        52 => Jump(reader.u32()?),
        53 => JumpIfTrue(reader.u32()?),
        54 => JumpIfFalse(reader.u32()?),
        55 => JumpIfNullish(reader.u32()?),
        56 => JumpIfNotNullish(reader.u32()?),
        57 => JumpIfNotUndefined(reader.u32()?),
        58 => Return,
        59 => Throw,
        60 => PushTry(reader.u32()?),
        61 => PopTry,
        62 => PushFinally(reader.u32()?),
        63 => PopFinally,
        64 => Pop,
        65 => Dup,
        66 => Dup2,
        67 => Swap,
        68 => Rot3,
        70 => CreateObject,
        71 => DefineField(reader.string()?),
        72 => DefineComputedField,
        73 => DefineMethod(reader.string()?, reader.method_kind()?),
        74 => DefineComputedMethod(reader.method_kind()?),
        75 => CopyDataProperties,
        76 => {
            let count = reader.count()?;
            let mut keys = Vec::with_capacity(count);
            for _ in 0..count {
                keys.push(reader.string()?);
            }
            ObjectRest(keys)
        }
        77 => CreateArray,
        78 => ArrayPush,
        79 => ArrayHole,
        80 => ArraySpread,
        81 => LoadProperty(reader.string()?),
        82 => StoreProperty(reader.string()?),
        83 => GetIndex,
        84 => SetIndex,
        85 => DeleteProperty(reader.string()?),
        86 => DeleteIndex,
        87 => LoadSuperProperty(reader.string()?),
        88 => LoadSuperIndex,
        90 => Call(reader.u8()?),
        91 => CallMethod(reader.u8()?),
        92 => CallNew(reader.u8()?),
        93 => CallWithArray,
        94 => CallMethodWithArray,
        95 => CallNewWithArray,
        96 => SuperCall(reader.u8()?),
        97 => SuperCallWithArray,
        100 => {
            let index = reader.u32()?;
            let count = reader.count()?;
            let mut upvalues = Vec::with_capacity(count);
            for _ in 0..count {
                let is_local = reader.bool()?;
                upvalues.push(UpvalueDescriptor::new(is_local, reader.u32()?));
            }
            CreateClosure(index, upvalues)
        }
        101 => CreateClass(reader.string()?, reader.bool()?),
        102 => DefineClassMethod(reader.string()?, reader.method_kind()?, reader.bool()?),
        103 => DefineComputedClassMethod(reader.method_kind()?, reader.bool()?),
        105 => GetIterator,
        106 => GetAsyncIterator,
        107 => GetPropertyIterator,
        108 => IteratorNext(reader.u32()?),
        109 => IteratorValue,
        110 => IteratorRest,
        111 => IteratorClose,
        112 => Await,
        113 => Yield,
        114 => YieldDelegate,
        115 => CreateRegExp(reader.u32()?, reader.u32()?),
        116 => ImportCall,
        117 => Debugger,
        tag => return Err(ChunkError::UnknownTag { what: "opcode", tag }),
    };
    Ok(opcode)
}

/// Bounds-checked little-endian reader.
struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ChunkError> {
        if self.remaining() < len {
            return Err(ChunkError::Truncated(self.bytes.len()));
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ChunkError> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self) -> Result<bool, ChunkError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(ChunkError::UnknownTag { what: "flag", tag }),
        }
    }

    fn u32(&mut self) -> Result<u32, ChunkError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, ChunkError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    /// A length prefix, bounded by the bytes left so a forged count cannot
    /// reserve more than the input could hold.
    fn count(&mut self) -> Result<usize, ChunkError> {
        let count = self.u32()? as usize;
        if count > self.remaining() {
            return Err(ChunkError::Truncated(self.bytes.len()));
        }
        Ok(count)
    }

    fn string(&mut self) -> Result<String, ChunkError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ChunkError::InvalidString)
    }

    fn method_kind(&mut self) -> Result<MethodKind, ChunkError> {
        match self.u8()? {
            0 => Ok(MethodKind::Method),
            1 => Ok(MethodKind::Getter),
            2 => Ok(MethodKind::Setter),
            tag => Err(ChunkError::UnknownTag { what: "method kind", tag }),
        }
    }
}
