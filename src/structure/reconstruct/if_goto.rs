//! Collapse of `if COND goto L1; goto L2; L1:` into one inverted conditional.

use crate::instruction::{Instruction, Op};

pub(crate) fn reconstruct(list: &mut Vec<Instruction>) {
    let mut i = 0;
    while i + 2 < list.len() {
        let collapses = list[i].is_conditional_branch()
            && matches!(list[i + 1].op, Op::Goto { .. })
            && list[i].jump_offset() == Some(list[i + 2].offset);
        if collapses {
            let goto_target = list[i + 1].jump_offset().unwrap_or(-1);
            list.remove(i + 1);
            let test = &mut list[i];
            test.invert_test();
            test.set_jump_offset(goto_target);
        }
        i += 1;
    }
}
