//! Input views consumed from the upstream class-file reader and the output
//! sinks written for the downstream source writer.

use std::collections::{BTreeSet, HashMap};

use crate::constant_pool::ConstantPool;
use crate::instruction::Instruction;
use crate::local_variables::LocalVariables;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct MethodAccessFlags(u16);

bitflags! {
    impl MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

/// One raw `exception_table` entry of a `Code` attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodeException {
    pub start_pc: i32,
    pub end_pc: i32,
    pub handler_pc: i32,
    /// Constant pool index of the caught class, 0 for catch-all.
    pub catch_type: u16,
}

/// One `LineNumberTable` entry.
#[derive(Clone, Copy, Debug)]
pub struct LineNumber {
    pub start_pc: i32,
    pub line_number: i32,
}

/// The per-method view the structural pass consumes and annotates.
#[derive(Clone, Debug)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    /// Index of the generic `Signature` attribute UTF-8, 0 when absent.
    pub signature_index: u16,
    /// Raw `Code` bytes, kept for goto-chain walking.
    pub code: Vec<u8>,
    pub exception_table: Vec<CodeException>,
    pub line_numbers: Vec<LineNumber>,
    pub local_variables: LocalVariables,
    /// Output: the fully analyzed nested instruction list.
    pub fast_nodes: Vec<Instruction>,
    /// Output: set when per-method analysis failed; partial `fast_nodes` are
    /// left in place.
    pub contains_error: bool,
}

impl Method {
    pub fn new(
        access_flags: MethodAccessFlags,
        name_index: u16,
        descriptor_index: u16,
        code: Vec<u8>,
        exception_table: Vec<CodeException>,
        local_variables: LocalVariables,
    ) -> Self {
        Method {
            access_flags,
            name_index,
            descriptor_index,
            signature_index: 0,
            code,
            exception_table,
            line_numbers: Vec::new(),
            local_variables,
            fast_nodes: Vec::new(),
            contains_error: false,
        }
    }
}

/// The per-class view: constant pool plus the synthetic `$SwitchMap$...`
/// registry (UTF-8 name index of the field to its ordinal-to-key table).
#[derive(Clone, Debug)]
pub struct ClassContext {
    pub major_version: u16,
    pub this_class: u16,
    pub constant_pool: ConstantPool,
    pub switch_maps: HashMap<u16, HashMap<i32, i32>>,
}

impl ClassContext {
    pub fn new(major_version: u16, this_class: u16, constant_pool: ConstantPool) -> Self {
        ClassContext {
            major_version,
            this_class,
            constant_pool,
            switch_maps: HashMap::new(),
        }
    }
}

/// Sink collecting internal type names referenced during reconstruction, fed
/// to the downstream import manager.
#[derive(Clone, Debug, Default)]
pub struct ReferenceMap {
    names: BTreeSet<String>,
}

impl ReferenceMap {
    pub fn add(&mut self, internal_name: &str) {
        self.names.insert(internal_name.to_string());
    }

    pub fn contains(&self, internal_name: &str) -> bool {
        self.names.contains(internal_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.names.iter()
    }
}

/// Options gating the vendor-specific recognizers. All on by default.
#[derive(Clone, Debug)]
pub struct StructureOptions {
    pub desugar_foreach: bool,
    pub desugar_enum_switch: bool,
    pub desugar_string_switch: bool,
    pub desugar_assert: bool,
    pub recognize_dot_class: bool,
}

impl Default for StructureOptions {
    fn default() -> Self {
        StructureOptions {
            desugar_foreach: true,
            desugar_enum_switch: true,
            desugar_string_switch: true,
            desugar_assert: true,
            recognize_dot_class: true,
        }
    }
}
