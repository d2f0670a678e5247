//! Append-only constant pool view.
//!
//! The pool is 1-based like the class-file format; slot 0 and the upper halves
//! of `Long`/`Double` entries are `Unusable`. The structural pass only ever
//! appends (new UTF-8, Class, NameAndType and Fieldref entries for inserted
//! casts and accessor rewrites); existing indices stay stable.

/// A single constant pool entry.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    FieldRef { class_index: u16, name_and_type_index: u16 },
    MethodRef { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    Unusable,
}

#[derive(Clone, Debug, Default)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub fn new(entries: Vec<Constant>) -> Self {
        ConstantPool { entries }
    }

    fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get((index as usize).checked_sub(1)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_utf8(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            Constant::Utf8(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_class_name(&self, class_index: u16) -> Option<&str> {
        match self.get(class_index)? {
            Constant::Class { name_index } => self.get_utf8(*name_index),
            _ => None,
        }
    }

    pub fn get_string(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            Constant::String { string_index } => self.get_utf8(*string_index),
            _ => None,
        }
    }

    pub fn get_name_and_type(&self, nat_index: u16) -> Option<(&str, &str)> {
        match self.get(nat_index)? {
            Constant::NameAndType { name_index, descriptor_index } => {
                let name = self.get_utf8(*name_index)?;
                let desc = self.get_utf8(*descriptor_index)?;
                Some((name, desc))
            }
            _ => None,
        }
    }

    /// Resolve a FieldRef, MethodRef or InterfaceMethodRef to
    /// `(class_name, member_name, descriptor)`.
    pub fn resolve_ref(&self, index: u16) -> Option<(&str, &str, &str)> {
        let (class_index, nat_index) = match self.get(index)? {
            Constant::FieldRef { class_index, name_and_type_index }
            | Constant::MethodRef { class_index, name_and_type_index }
            | Constant::InterfaceMethodRef { class_index, name_and_type_index } => {
                (*class_index, *name_and_type_index)
            }
            _ => return None,
        };
        let class_name = self.get_class_name(class_index)?;
        let (name, desc) = self.get_name_and_type(nat_index)?;
        Some((class_name, name, desc))
    }

    /// Class index of a field/method ref, for same-class checks.
    pub fn ref_class_index(&self, index: u16) -> Option<u16> {
        match self.get(index)? {
            Constant::FieldRef { class_index, .. }
            | Constant::MethodRef { class_index, .. }
            | Constant::InterfaceMethodRef { class_index, .. } => Some(*class_index),
            _ => None,
        }
    }

    /// Name index (into UTF-8) of the member referenced by a field/method ref.
    pub fn ref_name_index(&self, index: u16) -> Option<u16> {
        let nat_index = match self.get(index)? {
            Constant::FieldRef { name_and_type_index, .. }
            | Constant::MethodRef { name_and_type_index, .. }
            | Constant::InterfaceMethodRef { name_and_type_index, .. } => *name_and_type_index,
            _ => return None,
        };
        match self.get(nat_index)? {
            Constant::NameAndType { name_index, .. } => Some(*name_index),
            _ => None,
        }
    }

    fn push(&mut self, constant: Constant) -> u16 {
        self.entries.push(constant);
        self.entries.len() as u16
    }

    /// Append a UTF-8 entry, reusing an existing one when present.
    pub fn add_utf8(&mut self, value: &str) -> u16 {
        for (i, entry) in self.entries.iter().enumerate() {
            if let Constant::Utf8(s) = entry {
                if s == value {
                    return (i + 1) as u16;
                }
            }
        }
        self.push(Constant::Utf8(value.to_string()))
    }

    pub fn add_class(&mut self, internal_name: &str) -> u16 {
        let name_index = self.add_utf8(internal_name);
        for (i, entry) in self.entries.iter().enumerate() {
            if let Constant::Class { name_index: n } = entry {
                if *n == name_index {
                    return (i + 1) as u16;
                }
            }
        }
        self.push(Constant::Class { name_index })
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.add_utf8(name);
        let descriptor_index = self.add_utf8(descriptor);
        self.push(Constant::NameAndType { name_index, descriptor_index })
    }

    pub fn add_field_ref(&mut self, class_name: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.add_class(class_name);
        let name_and_type_index = self.add_name_and_type(name, descriptor);
        self.push(Constant::FieldRef { class_index, name_and_type_index })
    }

    pub fn add_method_ref(&mut self, class_name: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.add_class(class_name);
        let name_and_type_index = self.add_name_and_type(name, descriptor);
        self.push(Constant::MethodRef { class_index, name_and_type_index })
    }

    pub fn add_interface_method_ref(&mut self, class_name: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.add_class(class_name);
        let name_and_type_index = self.add_name_and_type(name, descriptor);
        self.push(Constant::InterfaceMethodRef { class_index, name_and_type_index })
    }

    pub fn add_string(&mut self, value: &str) -> u16 {
        let string_index = self.add_utf8(value);
        self.push(Constant::String { string_index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_are_monotonic_and_stable() {
        let mut pool = ConstantPool::new(vec![Constant::Utf8("existing".into())]);
        let a = pool.add_utf8("Ljava/lang/String;");
        let b = pool.add_class("java/lang/String");
        assert!(a > 1);
        assert!(b > a);
        assert_eq!(pool.get_utf8(1), Some("existing"));
        assert_eq!(pool.get_class_name(b), Some("java/lang/String"));
        // Re-adding the same UTF-8 reuses the slot.
        assert_eq!(pool.add_utf8("Ljava/lang/String;"), a);
    }

    #[test]
    fn resolve_ref_walks_name_and_type() {
        let mut pool = ConstantPool::default();
        let idx = pool.add_field_ref("java/lang/System", "out", "Ljava/io/PrintStream;");
        assert_eq!(
            pool.resolve_ref(idx),
            Some(("java/lang/System", "out", "Ljava/io/PrintStream;"))
        );
    }
}
