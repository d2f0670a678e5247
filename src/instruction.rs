//! The unified instruction node.
//!
//! Every node carries the byte offset it originated at, a source line number
//! (`UNKNOWN_LINE_NUMBER` when absent) and an opcode-specific payload. Real
//! bytecode statements and the synthetic high-level constructs produced by the
//! structural pass share this one type, so a list cell can be rewritten in
//! place from one to the other.
//!
//! Branch payloads store the signed delta; the target is `offset + branch`.

use crate::constant_pool::ConstantPool;
use crate::local_variables::LocalVariables;

pub const UNKNOWN_LINE_NUMBER: i32 = -1;

/// Comparison relation of a conditional branch, in source polarity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Cmp {
    pub fn invert(self) -> Self {
        match self {
            Cmp::Eq => Cmp::Ne,
            Cmp::Ne => Cmp::Eq,
            Cmp::Lt => Cmp::Ge,
            Cmp::Ge => Cmp::Lt,
            Cmp::Gt => Cmp::Le,
            Cmp::Le => Cmp::Gt,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Cmp::Eq => "==",
            Cmp::Ne => "!=",
            Cmp::Lt => "<",
            Cmp::Ge => ">=",
            Cmp::Gt => ">",
            Cmp::Le => "<=",
        }
    }
}

/// The `lcmp`/`fcmpl`/`fcmpg`/`dcmpl`/`dcmpg` family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpKind {
    LCmp,
    FCmpL,
    FCmpG,
    DCmpL,
    DCmpG,
}

/// Connector of an aggregated multi-test condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

/// Which lowering a recognized `switch` came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchKind {
    Plain,
    Enum,
    String,
}

/// One arm of a recognized `switch`: the default arm carries `is_default`
/// and an irrelevant key. After string-switch recognition `key` holds the
/// string constant pool index instead of the hash-bucket value.
#[derive(Clone, Debug)]
pub struct CasePair {
    pub is_default: bool,
    pub key: i32,
    pub offset: i32,
    pub instructions: Option<Vec<Instruction>>,
}

/// One catch clause of a recognized `try`.
#[derive(Clone, Debug)]
pub struct FastCatch {
    pub exception_load_offset: i32,
    /// Constant pool index of the caught class.
    pub type_index: u16,
    /// Additional types of a multi-catch, outermost aggregation order.
    pub other_type_indexes: Vec<u16>,
    /// Slot of the exception variable.
    pub var_index: u16,
    pub instructions: Vec<Instruction>,
}

#[derive(Clone, Debug)]
pub struct Instruction {
    pub offset: i32,
    pub line_number: i32,
    pub op: Op,
}

/// Opcode tag plus payload. Operand positions hold fully folded expression
/// trees produced by the upstream stack reconstruction.
#[derive(Clone, Debug)]
pub enum Op {
    // --- constants ---
    AConstNull,
    IConst { value: i32, signature: String },
    LConst { value: i64 },
    FConst { value: f32 },
    DConst { value: f64 },
    Ldc { index: u16 },
    Ldc2W { index: u16 },

    // --- locals ---
    ALoad { index: u16 },
    ILoad { index: u16 },
    Load { index: u16, signature: String },
    AStore { index: u16, valueref: Box<Instruction> },
    IStore { index: u16, valueref: Box<Instruction> },
    Store { index: u16, signature: String, valueref: Box<Instruction> },
    Iinc { index: u16, count: i16 },

    // --- arrays ---
    ArrayLoad { arrayref: Box<Instruction>, indexref: Box<Instruction>, signature: String },
    ArrayStore { arrayref: Box<Instruction>, indexref: Box<Instruction>, valueref: Box<Instruction> },
    ArrayLength { arrayref: Box<Instruction> },
    NewArray { type_code: u8, dimension: Box<Instruction> },
    ANewArray { index: u16, dimension: Box<Instruction> },

    // --- fields ---
    GetField { index: u16, objectref: Box<Instruction> },
    PutField { index: u16, objectref: Box<Instruction>, valueref: Box<Instruction> },
    GetStatic { index: u16 },
    PutStatic { index: u16, valueref: Box<Instruction> },

    // --- calls ---
    Invokevirtual { index: u16, objectref: Box<Instruction>, args: Vec<Instruction> },
    Invokespecial { index: u16, objectref: Box<Instruction>, args: Vec<Instruction> },
    Invokeinterface { index: u16, objectref: Box<Instruction>, args: Vec<Instruction> },
    Invokestatic { index: u16, args: Vec<Instruction> },
    InvokeNew { index: u16, args: Vec<Instruction> },

    // --- operators ---
    BinaryOp { operator: String, value1: Box<Instruction>, value2: Box<Instruction> },
    Cmp { kind: CmpKind, value1: Box<Instruction>, value2: Box<Instruction> },
    Assignment { operator: String, value1: Box<Instruction>, value2: Box<Instruction> },
    TernaryOp { test: Box<Instruction>, value1: Box<Instruction>, value2: Box<Instruction> },
    /// True-branch stack value stranded by the compiler's ternary lowering;
    /// folded away by the ternary reconstructor.
    TernaryOpStore { value: Box<Instruction> },

    // --- control ---
    Goto { branch: i32 },
    Jsr { branch: i32 },
    Ret { index: u16 },
    If { cmp: Cmp, value: Box<Instruction>, branch: i32 },
    IfCmp { cmp: Cmp, value1: Box<Instruction>, value2: Box<Instruction>, branch: i32 },
    IfXNull { cmp: Cmp, value: Box<Instruction>, branch: i32 },
    ComplexIf { cmp: BoolOp, instructions: Vec<Instruction>, branch: i32 },
    /// `tableswitch`/`lookupswitch`; `offsets` are relative to this node.
    Switch { key: Box<Instruction>, default_offset: i32, keys: Vec<i32>, offsets: Vec<i32> },
    Return,
    XReturn { valueref: Box<Instruction> },
    Athrow { value: Box<Instruction> },

    // --- objects, casts, stack ---
    New { index: u16 },
    CheckCast { index: u16, objectref: Box<Instruction> },
    InstanceOf { index: u16, objectref: Box<Instruction> },
    Pop { objectref: Box<Instruction> },
    MonitorEnter { objectref: Box<Instruction> },
    MonitorExit { objectref: Box<Instruction> },
    DupStore { objectref: Box<Instruction> },
    /// Reference to the value kept by the `DupStore` at `dup_offset`.
    DupLoad { dup_offset: i32 },

    // --- pseudo instructions ---
    /// Caught exception entering a handler; `exception_name_index == 0` marks
    /// a catch-all (finally) handler.
    ExceptionLoad { exception_name_index: u16, index: u16 },
    ReturnAddressLoad,
    ClassLiteral { class_index: u16 },
    Assert { test: Box<Instruction>, msg: Option<Box<Instruction>> },
    NewAndInitArray { new_array: Box<Instruction>, values: Vec<Instruction> },
    InitArray { new_array: Box<Instruction>, values: Vec<Instruction> },

    // --- synthetic high-level nodes ---
    Declare { lv_index: u16, lv_start_pc: i32, store: Option<Box<Instruction>> },
    Label { wrapped: Option<Box<Instruction>> },
    IfSimple { test: Box<Instruction>, branch: i32, instructions: Vec<Instruction> },
    IfElse {
        test: Box<Instruction>,
        branch: i32,
        instructions: Vec<Instruction>,
        else_instructions: Vec<Instruction>,
    },
    IfBreak { test: Box<Instruction> },
    IfContinue { test: Box<Instruction> },
    IfLabeledBreak { test: Box<Instruction>, target: i32 },
    GotoBreak,
    GotoContinue,
    GotoLabeledBreak { target: i32 },
    While { test: Box<Instruction>, branch: i32, instructions: Vec<Instruction> },
    DoWhile { test: Box<Instruction>, branch: i32, instructions: Vec<Instruction> },
    For {
        init: Option<Box<Instruction>>,
        test: Option<Box<Instruction>>,
        increment: Option<Box<Instruction>>,
        branch: i32,
        instructions: Vec<Instruction>,
    },
    ForEach {
        variable: Box<Instruction>,
        values: Box<Instruction>,
        branch: i32,
        instructions: Vec<Instruction>,
    },
    InfiniteLoop { branch: i32, instructions: Vec<Instruction> },
    FastSwitch { kind: SwitchKind, test: Box<Instruction>, branch: i32, pairs: Vec<CasePair> },
    Try {
        branch: i32,
        instructions: Vec<Instruction>,
        catches: Vec<FastCatch>,
        finally_instructions: Option<Vec<Instruction>>,
    },
    Synchronized { monitor: Box<Instruction>, branch: i32, instructions: Vec<Instruction> },
}

impl Instruction {
    pub fn new(offset: i32, line_number: i32, op: Op) -> Self {
        Instruction { offset, line_number, op }
    }

    /// True for the four conditional-branch shapes.
    pub fn is_conditional_branch(&self) -> bool {
        matches!(
            self.op,
            Op::If { .. } | Op::IfCmp { .. } | Op::IfXNull { .. } | Op::ComplexIf { .. }
        )
    }

    pub fn is_store(&self) -> bool {
        matches!(self.op, Op::AStore { .. } | Op::IStore { .. } | Op::Store { .. })
    }

    pub fn store_slot(&self) -> Option<u16> {
        match &self.op {
            Op::AStore { index, .. } | Op::IStore { index, .. } | Op::Store { index, .. } => {
                Some(*index)
            }
            _ => None,
        }
    }

    pub fn store_valueref(&self) -> Option<&Instruction> {
        match &self.op {
            Op::AStore { valueref, .. }
            | Op::IStore { valueref, .. }
            | Op::Store { valueref, .. } => Some(valueref),
            _ => None,
        }
    }

    pub fn load_slot(&self) -> Option<u16> {
        match &self.op {
            Op::ALoad { index } | Op::ILoad { index } | Op::Load { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Signed branch delta for every branch-carrying node.
    pub fn branch(&self) -> Option<i32> {
        match &self.op {
            Op::Goto { branch }
            | Op::Jsr { branch }
            | Op::If { branch, .. }
            | Op::IfCmp { branch, .. }
            | Op::IfXNull { branch, .. }
            | Op::ComplexIf { branch, .. }
            | Op::IfSimple { branch, .. }
            | Op::IfElse { branch, .. }
            | Op::While { branch, .. }
            | Op::DoWhile { branch, .. }
            | Op::For { branch, .. }
            | Op::ForEach { branch, .. }
            | Op::InfiniteLoop { branch, .. }
            | Op::FastSwitch { branch, .. }
            | Op::Try { branch, .. }
            | Op::Synchronized { branch, .. } => Some(*branch),
            _ => None,
        }
    }

    /// Absolute jump target: `offset + branch`, or the registered label
    /// target for the labeled-break forms.
    pub fn jump_offset(&self) -> Option<i32> {
        match &self.op {
            Op::GotoLabeledBreak { target } | Op::IfLabeledBreak { target, .. } => Some(*target),
            _ => self.branch().map(|b| self.offset + b),
        }
    }

    pub fn set_branch(&mut self, new_branch: i32) {
        match &mut self.op {
            Op::Goto { branch }
            | Op::Jsr { branch }
            | Op::If { branch, .. }
            | Op::IfCmp { branch, .. }
            | Op::IfXNull { branch, .. }
            | Op::ComplexIf { branch, .. }
            | Op::IfSimple { branch, .. }
            | Op::IfElse { branch, .. }
            | Op::While { branch, .. }
            | Op::DoWhile { branch, .. }
            | Op::For { branch, .. }
            | Op::ForEach { branch, .. }
            | Op::InfiniteLoop { branch, .. }
            | Op::FastSwitch { branch, .. }
            | Op::Try { branch, .. }
            | Op::Synchronized { branch, .. } => *branch = new_branch,
            _ => {}
        }
    }

    pub fn set_jump_offset(&mut self, target: i32) {
        let delta = target - self.offset;
        self.set_branch(delta);
    }

    /// Invert the comparison of a conditional branch in place. Aggregated
    /// conditions invert by De Morgan: the connector flips and every
    /// sub-condition inverts.
    pub fn invert_test(&mut self) {
        match &mut self.op {
            Op::If { cmp, .. } | Op::IfCmp { cmp, .. } | Op::IfXNull { cmp, .. } => {
                *cmp = cmp.invert();
            }
            Op::ComplexIf { cmp, instructions, .. } => {
                *cmp = match cmp {
                    BoolOp::And => BoolOp::Or,
                    BoolOp::Or => BoolOp::And,
                };
                for sub in instructions.iter_mut() {
                    sub.invert_test();
                }
            }
            _ => {}
        }
    }

    /// Pre-order traversal of this node and every nested instruction,
    /// operands and high-level bodies included.
    pub fn walk(&self, f: &mut dyn FnMut(&Instruction)) {
        f(self);
        self.for_each_child(&mut |child| child.walk(&mut *f));
    }

    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut Instruction)) {
        f(self);
        self.for_each_child_mut(&mut |child| child.walk_mut(&mut *f));
    }

    /// First nested instruction (self included) matching the predicate.
    pub fn find<'a>(&'a self, pred: &dyn Fn(&Instruction) -> bool) -> Option<&'a Instruction> {
        if pred(self) {
            return Some(self);
        }
        let mut found = None;
        self.for_each_child(&mut |child| {
            if found.is_none() {
                found = child.find(pred);
            }
        });
        found
    }

    pub fn any(&self, pred: &dyn Fn(&Instruction) -> bool) -> bool {
        self.find(pred).is_some()
    }

    fn for_each_child<'a>(&'a self, f: &mut dyn FnMut(&'a Instruction)) {
        match &self.op {
            Op::AStore { valueref, .. }
            | Op::IStore { valueref, .. }
            | Op::Store { valueref, .. }
            | Op::PutStatic { valueref, .. }
            | Op::XReturn { valueref } => f(valueref),
            Op::ArrayLoad { arrayref, indexref, .. } => {
                f(arrayref);
                f(indexref);
            }
            Op::ArrayStore { arrayref, indexref, valueref } => {
                f(arrayref);
                f(indexref);
                f(valueref);
            }
            Op::ArrayLength { arrayref } => f(arrayref),
            Op::NewArray { dimension, .. } | Op::ANewArray { dimension, .. } => f(dimension),
            Op::GetField { objectref, .. }
            | Op::CheckCast { objectref, .. }
            | Op::InstanceOf { objectref, .. }
            | Op::Pop { objectref }
            | Op::MonitorEnter { objectref }
            | Op::MonitorExit { objectref }
            | Op::DupStore { objectref } => f(objectref),
            Op::PutField { objectref, valueref, .. } => {
                f(objectref);
                f(valueref);
            }
            Op::Invokevirtual { objectref, args, .. }
            | Op::Invokespecial { objectref, args, .. }
            | Op::Invokeinterface { objectref, args, .. } => {
                f(objectref);
                for a in args {
                    f(a);
                }
            }
            Op::Invokestatic { args, .. } | Op::InvokeNew { args, .. } => {
                for a in args {
                    f(a);
                }
            }
            Op::BinaryOp { value1, value2, .. }
            | Op::Cmp { value1, value2, .. }
            | Op::Assignment { value1, value2, .. }
            | Op::IfCmp { value1, value2, .. } => {
                f(value1);
                f(value2);
            }
            Op::TernaryOp { test, value1, value2 } => {
                f(test);
                f(value1);
                f(value2);
            }
            Op::TernaryOpStore { value } | Op::Athrow { value } => f(value),
            Op::If { value, .. } | Op::IfXNull { value, .. } => f(value),
            Op::ComplexIf { instructions, .. } => {
                for i in instructions {
                    f(i);
                }
            }
            Op::Switch { key, .. } => f(key),
            Op::Assert { test, msg } => {
                f(test);
                if let Some(m) = msg {
                    f(m);
                }
            }
            Op::NewAndInitArray { new_array, values } | Op::InitArray { new_array, values } => {
                f(new_array);
                for v in values {
                    f(v);
                }
            }
            Op::Declare { store, .. } => {
                if let Some(s) = store {
                    f(s);
                }
            }
            Op::Label { wrapped } => {
                if let Some(w) = wrapped {
                    f(w);
                }
            }
            Op::IfSimple { test, instructions, .. } => {
                f(test);
                for i in instructions {
                    f(i);
                }
            }
            Op::IfElse { test, instructions, else_instructions, .. } => {
                f(test);
                for i in instructions {
                    f(i);
                }
                for i in else_instructions {
                    f(i);
                }
            }
            Op::IfBreak { test } | Op::IfContinue { test } | Op::IfLabeledBreak { test, .. } => {
                f(test)
            }
            Op::While { test, instructions, .. } | Op::DoWhile { test, instructions, .. } => {
                f(test);
                for i in instructions {
                    f(i);
                }
            }
            Op::For { init, test, increment, instructions, .. } => {
                if let Some(i) = init {
                    f(i);
                }
                if let Some(t) = test {
                    f(t);
                }
                if let Some(inc) = increment {
                    f(inc);
                }
                for i in instructions {
                    f(i);
                }
            }
            Op::ForEach { variable, values, instructions, .. } => {
                f(variable);
                f(values);
                for i in instructions {
                    f(i);
                }
            }
            Op::InfiniteLoop { instructions, .. } => {
                for i in instructions {
                    f(i);
                }
            }
            Op::FastSwitch { test, pairs, .. } => {
                f(test);
                for pair in pairs {
                    if let Some(instructions) = &pair.instructions {
                        for i in instructions {
                            f(i);
                        }
                    }
                }
            }
            Op::Try { instructions, catches, finally_instructions, .. } => {
                for i in instructions {
                    f(i);
                }
                for c in catches {
                    for i in &c.instructions {
                        f(i);
                    }
                }
                if let Some(fi) = finally_instructions {
                    for i in fi {
                        f(i);
                    }
                }
            }
            Op::Synchronized { monitor, instructions, .. } => {
                f(monitor);
                for i in instructions {
                    f(i);
                }
            }
            _ => {}
        }
    }

    fn for_each_child_mut<'a>(&'a mut self, f: &mut dyn FnMut(&'a mut Instruction)) {
        match &mut self.op {
            Op::AStore { valueref, .. }
            | Op::IStore { valueref, .. }
            | Op::Store { valueref, .. }
            | Op::PutStatic { valueref, .. }
            | Op::XReturn { valueref } => f(valueref),
            Op::ArrayLoad { arrayref, indexref, .. } => {
                f(arrayref);
                f(indexref);
            }
            Op::ArrayStore { arrayref, indexref, valueref } => {
                f(arrayref);
                f(indexref);
                f(valueref);
            }
            Op::ArrayLength { arrayref } => f(arrayref),
            Op::NewArray { dimension, .. } | Op::ANewArray { dimension, .. } => f(dimension),
            Op::GetField { objectref, .. }
            | Op::CheckCast { objectref, .. }
            | Op::InstanceOf { objectref, .. }
            | Op::Pop { objectref }
            | Op::MonitorEnter { objectref }
            | Op::MonitorExit { objectref }
            | Op::DupStore { objectref } => f(objectref),
            Op::PutField { objectref, valueref, .. } => {
                f(objectref);
                f(valueref);
            }
            Op::Invokevirtual { objectref, args, .. }
            | Op::Invokespecial { objectref, args, .. }
            | Op::Invokeinterface { objectref, args, .. } => {
                f(objectref);
                for a in args {
                    f(a);
                }
            }
            Op::Invokestatic { args, .. } | Op::InvokeNew { args, .. } => {
                for a in args {
                    f(a);
                }
            }
            Op::BinaryOp { value1, value2, .. }
            | Op::Cmp { value1, value2, .. }
            | Op::Assignment { value1, value2, .. }
            | Op::IfCmp { value1, value2, .. } => {
                f(value1);
                f(value2);
            }
            Op::TernaryOp { test, value1, value2 } => {
                f(test);
                f(value1);
                f(value2);
            }
            Op::TernaryOpStore { value } | Op::Athrow { value } => f(value),
            Op::If { value, .. } | Op::IfXNull { value, .. } => f(value),
            Op::ComplexIf { instructions, .. } => {
                for i in instructions {
                    f(i);
                }
            }
            Op::Switch { key, .. } => f(key),
            Op::Assert { test, msg } => {
                f(test);
                if let Some(m) = msg {
                    f(m);
                }
            }
            Op::NewAndInitArray { new_array, values } | Op::InitArray { new_array, values } => {
                f(new_array);
                for v in values {
                    f(v);
                }
            }
            Op::Declare { store, .. } => {
                if let Some(s) = store {
                    f(s);
                }
            }
            Op::Label { wrapped } => {
                if let Some(w) = wrapped {
                    f(w);
                }
            }
            Op::IfSimple { test, instructions, .. } => {
                f(test);
                for i in instructions {
                    f(i);
                }
            }
            Op::IfElse { test, instructions, else_instructions, .. } => {
                f(test);
                for i in instructions {
                    f(i);
                }
                for i in else_instructions {
                    f(i);
                }
            }
            Op::IfBreak { test } | Op::IfContinue { test } | Op::IfLabeledBreak { test, .. } => {
                f(test)
            }
            Op::While { test, instructions, .. } | Op::DoWhile { test, instructions, .. } => {
                f(test);
                for i in instructions {
                    f(i);
                }
            }
            Op::For { init, test, increment, instructions, .. } => {
                if let Some(i) = init {
                    f(i);
                }
                if let Some(t) = test {
                    f(t);
                }
                if let Some(inc) = increment {
                    f(inc);
                }
                for i in instructions {
                    f(i);
                }
            }
            Op::ForEach { variable, values, instructions, .. } => {
                f(variable);
                f(values);
                for i in instructions {
                    f(i);
                }
            }
            Op::InfiniteLoop { instructions, .. } => {
                for i in instructions {
                    f(i);
                }
            }
            Op::FastSwitch { test, pairs, .. } => {
                f(test);
                for pair in pairs {
                    if let Some(instructions) = &mut pair.instructions {
                        for i in instructions {
                            f(i);
                        }
                    }
                }
            }
            Op::Try { instructions, catches, finally_instructions, .. } => {
                for i in instructions {
                    f(i);
                }
                for c in catches {
                    for i in &mut c.instructions {
                        f(i);
                    }
                }
                if let Some(fi) = finally_instructions {
                    for i in fi {
                        f(i);
                    }
                }
            }
            Op::Synchronized { monitor, instructions, .. } => {
                f(monitor);
                for i in instructions {
                    f(i);
                }
            }
            _ => {}
        }
    }

    /// Reconstructed signature of the value this expression produces, when it
    /// can be derived without full type inference. Used to decide whether an
    /// `areturn` needs an inserted cast.
    pub fn returned_signature(
        &self,
        pool: &ConstantPool,
        local_variables: &LocalVariables,
    ) -> Option<String> {
        match &self.op {
            Op::AConstNull => Some("Ljava/lang/Object;".to_string()),
            Op::IConst { signature, .. } => Some(signature.clone()),
            Op::LConst { .. } => Some("J".to_string()),
            Op::FConst { .. } => Some("F".to_string()),
            Op::DConst { .. } => Some("D".to_string()),
            Op::Load { signature, .. } => Some(signature.clone()),
            Op::ILoad { .. } => Some("I".to_string()),
            Op::ALoad { index } => {
                let lv = local_variables.with_index_and_offset(*index, self.offset)?;
                pool.get_utf8(lv.signature_index).map(str::to_string)
            }
            Op::ArrayLoad { signature, .. } => Some(signature.clone()),
            Op::GetField { index, .. } | Op::GetStatic { index } => {
                pool.resolve_ref(*index).map(|(_, _, desc)| desc.to_string())
            }
            Op::Invokevirtual { index, .. }
            | Op::Invokespecial { index, .. }
            | Op::Invokeinterface { index, .. }
            | Op::Invokestatic { index, .. } => {
                let (_, _, desc) = pool.resolve_ref(*index)?;
                desc.rsplit(')').next().map(str::to_string)
            }
            Op::InvokeNew { index, .. } => {
                let class_name = pool
                    .resolve_ref(*index)
                    .map(|(class_name, _, _)| class_name.to_string())?;
                Some(format!("L{};", class_name))
            }
            Op::CheckCast { index, .. } => {
                let name = pool.get_class_name(*index)?;
                if name.starts_with('[') {
                    Some(name.to_string())
                } else {
                    Some(format!("L{};", name))
                }
            }
            Op::Ldc { index } | Op::Ldc2W { index } => match pool.get_utf8(*index) {
                Some(_) => Some("Ljava/lang/String;".to_string()),
                None => None,
            },
            Op::TernaryOp { value1, .. } => value1.returned_signature(pool, local_variables),
            Op::Assignment { value2, .. } => value2.returned_signature(pool, local_variables),
            _ => None,
        }
    }
}
