//! `.class` literal recognition for class files compiled before Java 5 and
//! for the Eclipse compiler.
//!
//! Both compilers cache the looked-up class in a synthetic static field and
//! guard every use with a null check on it:
//!
//! ```text
//! if (class$Foo != null) goto USE
//! class$Foo = class$("Foo")
//! USE: ... class$Foo ...
//! ```
//!
//! The Eclipse variant threads the field value through a dup instead of
//! reloading it. Either way the whole diamond collapses to a class literal.

use crate::instruction::{Instruction, Op};
use crate::types::{ClassContext, ReferenceMap};

pub(crate) fn reconstruct(
    class: &mut ClassContext,
    reference_map: &mut ReferenceMap,
    list: &mut Vec<Instruction>,
) {
    let mut i = 0;
    while i + 2 < list.len() {
        match match_guard_diamond(class, list, i) {
            Some((field_index, guard_dup_offset, class_name)) => {
                let class_index = class.constant_pool.add_class(&class_name);
                reference_map.add(&class_name);

                list.remove(i + 1);
                let guard = list.remove(i);
                let line_number = guard.line_number;

                // Patch every use in the convergence statement.
                let consumer = &mut list[i];
                consumer.walk_mut(&mut |node| {
                    let replace = match &node.op {
                        Op::GetStatic { index } => *index == field_index,
                        Op::DupLoad { dup_offset } => *dup_offset == guard_dup_offset,
                        _ => false,
                    };
                    if replace {
                        node.line_number = line_number;
                        node.op = Op::ClassLiteral { class_index };
                    }
                });
            }
            None => i += 1,
        }
    }
}

/// Match the three-node diamond starting at `i`; returns the cache field
/// index, the dup offset carrying the guard value (-1 without dup) and the
/// internal class name.
fn match_guard_diamond(
    class: &ClassContext,
    list: &[Instruction],
    i: usize,
) -> Option<(u16, i32, String)> {
    let (field_index, guard_dup_offset) = match &list[i].op {
        Op::If { cmp, value, .. } | Op::IfXNull { cmp, value, .. } => {
            if *cmp != crate::instruction::Cmp::Ne {
                return None;
            }
            match &value.op {
                Op::GetStatic { index } => (*index, -1),
                Op::DupStore { objectref } => match objectref.op {
                    Op::GetStatic { index } => (index, value.offset),
                    _ => return None,
                },
                _ => return None,
            }
        }
        _ => return None,
    };

    if list[i].jump_offset() != Some(list[i + 2].offset) {
        return None;
    }

    // The cache field is synthetic: `class$...` or `array$...`.
    let (_, field_name, _) = class.constant_pool.resolve_ref(field_index)?;
    if !field_name.starts_with("class$") && !field_name.starts_with("array$") {
        return None;
    }

    // Cache fill: class$Foo = class$("Foo").
    let class_name = match &list[i + 1].op {
        Op::PutStatic { index, valueref } if *index == field_index => {
            class_dollar_argument(class, valueref)?
        }
        _ => return None,
    };

    Some((field_index, guard_dup_offset, class_name.replace('.', "/")))
}

/// The string handed to the synthetic `class$(String)` helper.
fn class_dollar_argument(class: &ClassContext, valueref: &Instruction) -> Option<String> {
    match &valueref.op {
        Op::Invokestatic { index, args } if args.len() == 1 => {
            let (_, method_name, _) = class.constant_pool.resolve_ref(*index)?;
            if method_name != "class$" {
                return None;
            }
            match &args[0].op {
                Op::Ldc { index } => {
                    class.constant_pool.get_string(*index).map(str::to_string)
                }
                _ => None,
            }
        }
        // Eclipse wraps the helper call in the dup that feeds the store.
        Op::DupStore { objectref } => class_dollar_argument(class, objectref),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant_pool::ConstantPool;
    use crate::instruction::Cmp;

    #[test]
    fn cache_guard_diamond_becomes_class_literal() {
        let mut pool = ConstantPool::default();
        let cache_field = pool.add_field_ref("T", "class$java$lang$String", "Ljava/lang/Class;");
        let helper = pool.add_method_ref("T", "class$", "(Ljava/lang/String;)Ljava/lang/Class;");
        let name_string = pool.add_string("java.lang.String");

        let mut class = ClassContext::new(48, 1, pool);
        let mut reference_map = ReferenceMap::default();

        let mut list = vec![
            // if (class$java$lang$String != null) goto 14
            Instruction::new(
                3,
                5,
                Op::If {
                    cmp: Cmp::Ne,
                    value: Box::new(Instruction::new(0, 5, Op::GetStatic { index: cache_field })),
                    branch: 11,
                },
            ),
            // class$java$lang$String = class$("java.lang.String")
            Instruction::new(
                10,
                5,
                Op::PutStatic {
                    index: cache_field,
                    valueref: Box::new(Instruction::new(
                        9,
                        5,
                        Op::Invokestatic {
                            index: helper,
                            args: vec![Instruction::new(6, 5, Op::Ldc { index: name_string })],
                        },
                    )),
                },
            ),
            // use: x = class$java$lang$String
            Instruction::new(
                14,
                5,
                Op::AStore {
                    index: 1,
                    valueref: Box::new(Instruction::new(13, 5, Op::GetStatic { index: cache_field })),
                },
            ),
        ];
        reconstruct(&mut class, &mut reference_map, &mut list);
        assert_eq!(list.len(), 1);
        match &list[0].op {
            Op::AStore { valueref, .. } => {
                match &valueref.op {
                    Op::ClassLiteral { class_index } => {
                        assert_eq!(
                            class.constant_pool.get_class_name(*class_index),
                            Some("java/lang/String")
                        );
                    }
                    other => panic!("expected class literal, got {:?}", other),
                }
            }
            other => panic!("expected store, got {:?}", other),
        }
        assert!(reference_map.contains("java/lang/String"));
    }
}
