//! Offset-indexed navigation over instruction lists.
//!
//! Lists stay strictly ordered by byte offset through every rewrite, so all
//! lookups here are linear scans with early exit, mirroring how offsets are
//! used as stable identities across splices.

use crate::instruction::{Instruction, Op};

/// Index of the instruction at exactly `offset`.
pub fn index_for_offset(list: &[Instruction], offset: i32) -> Option<usize> {
    list.iter().position(|i| i.offset == offset)
}

/// True when no branch in `list[first..after]` jumps into
/// `(first_offset, last_offset]`.
pub fn check_no_jump_to_interval(
    list: &[Instruction],
    first: usize,
    after: usize,
    first_offset: i32,
    last_offset: i32,
) -> bool {
    for instruction in &list[first..after.min(list.len())] {
        if matches!(
            instruction.op,
            Op::Goto { .. }
                | Op::If { .. }
                | Op::IfCmp { .. }
                | Op::IfXNull { .. }
                | Op::ComplexIf { .. }
        ) {
            if let Some(jump_offset) = instruction.jump_offset() {
                if first_offset < jump_offset && jump_offset <= last_offset {
                    return false;
                }
            }
        }
    }
    true
}

fn consider(min: &mut i32, jump_offset: i32, before_list_offset: i32, last_list_offset: i32) {
    if jump_offset != -1
        && (jump_offset <= before_list_offset || last_list_offset < jump_offset)
        && (*min == -1 || *min > jump_offset)
    {
        *min = jump_offset;
    }
}

/// Smallest jump target escaping `(before_list_offset, last_list_offset]`,
/// descending into already-built high-level bodies. Returns -1 when every
/// jump stays inside the window. Escapes may point backwards (before the
/// list) as well as forwards; the caller decides which it needs.
pub fn search_min_escape_offset(
    list: &[Instruction],
    before_list_offset: i32,
    last_list_offset: i32,
) -> i32 {
    let mut min = -1;

    for instruction in list.iter().rev() {
        match &instruction.op {
            Op::Goto { .. }
            | Op::If { .. }
            | Op::IfCmp { .. }
            | Op::IfXNull { .. }
            | Op::ComplexIf { .. } => {
                if let Some(jump_offset) = instruction.jump_offset() {
                    consider(&mut min, jump_offset, before_list_offset, last_list_offset);
                }
            }
            Op::For { instructions, .. }
            | Op::ForEach { instructions, .. }
            | Op::While { instructions, .. }
            | Op::DoWhile { instructions, .. }
            | Op::InfiniteLoop { instructions, .. }
            | Op::Synchronized { instructions, .. } => {
                let jump_offset =
                    search_min_escape_offset(instructions, before_list_offset, last_list_offset);
                consider(&mut min, jump_offset, before_list_offset, last_list_offset);
            }
            Op::Try { instructions, catches, finally_instructions, .. } => {
                if let Some(jump_offset) = instruction.jump_offset() {
                    consider(&mut min, jump_offset, before_list_offset, last_list_offset);
                }
                let jump_offset =
                    search_min_escape_offset(instructions, before_list_offset, last_list_offset);
                consider(&mut min, jump_offset, before_list_offset, last_list_offset);
                for c in catches {
                    let jump_offset = search_min_escape_offset(
                        &c.instructions,
                        before_list_offset,
                        last_list_offset,
                    );
                    consider(&mut min, jump_offset, before_list_offset, last_list_offset);
                }
                if let Some(finally_instructions) = finally_instructions {
                    let jump_offset = search_min_escape_offset(
                        finally_instructions,
                        before_list_offset,
                        last_list_offset,
                    );
                    consider(&mut min, jump_offset, before_list_offset, last_list_offset);
                }
            }
            Op::FastSwitch { pairs, .. } => {
                if let Some(jump_offset) = instruction.jump_offset() {
                    consider(&mut min, jump_offset, before_list_offset, last_list_offset);
                }
                for pair in pairs.iter().rev() {
                    if let Some(instructions) = &pair.instructions {
                        let jump_offset = search_min_escape_offset(
                            instructions,
                            before_list_offset,
                            last_list_offset,
                        );
                        consider(&mut min, jump_offset, before_list_offset, last_list_offset);
                    }
                }
            }
            _ => {}
        }
    }

    min
}

/// Return type section of a method descriptor.
pub fn method_returned_signature(descriptor: &str) -> &str {
    match descriptor.rfind(')') {
        Some(pos) => &descriptor[pos + 1..],
        None => descriptor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::UNKNOWN_LINE_NUMBER;

    fn goto(offset: i32, target: i32) -> Instruction {
        Instruction::new(offset, UNKNOWN_LINE_NUMBER, Op::Goto { branch: target - offset })
    }

    #[test]
    fn min_escape_ignores_interior_jumps() {
        let list = vec![goto(4, 8), goto(8, 20), goto(12, 2)];
        // Window (3, 12]: the jump to 8 is interior, 20 and 2 escape; 2 wins.
        assert_eq!(search_min_escape_offset(&list, 3, 12), 2);
        // Window (0, 30]: nothing escapes.
        assert_eq!(search_min_escape_offset(&list, 0, 30), -1);
    }

    #[test]
    fn interval_check_sees_only_real_jumps() {
        let list = vec![goto(4, 10), Instruction::new(6, 1, Op::Return)];
        assert!(!check_no_jump_to_interval(&list, 0, 2, 8, 12));
        assert!(check_no_jump_to_interval(&list, 0, 2, 10, 12));
        assert!(check_no_jump_to_interval(&list, 1, 2, 8, 12));
    }

    #[test]
    fn descriptor_return_type() {
        assert_eq!(method_returned_signature("(Ljava/lang/String;I)V"), "V");
        assert_eq!(method_returned_signature("()Ljava/lang/Object;"), "Ljava/lang/Object;");
    }
}
