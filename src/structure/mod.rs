//! The structural reconstruction pipeline.
//!
//! [`build`] runs once per method body: exception ranges aggregate into
//! protected regions, regions become `try`/`synchronized` nodes, the
//! expression battery normalizes the list, and [`analyze_list`] recursively
//! recognizes loops, switches and conditionals before declarations, jump
//! rewriting and labels finish the tree.
//!
//! Everything operates on one mutable, offset-ordered `Vec<Instruction>`;
//! scope boundaries travel top-down as plain offsets, so nested nodes never
//! need parent links.

pub mod exception;

mod blocks;
mod conditionals;
mod declarations;
mod foreach;
mod labels;
mod loops;
mod reconstruct;
mod switches;
mod util;

use std::collections::BTreeSet;

use crate::error::StructureError;
use crate::instruction::{Instruction, Op};
use crate::local_variables::{LocalVariables, DECLARED, NOT_DECLARED};
use crate::types::{ClassContext, Method, ReferenceMap, StructureOptions};

/// Offsets delimiting the current analysis window. `-1` means "unknown".
///
/// `before_loop_entry`/`loop_entry` bracket the enclosing loop's entry (the
/// increment for `for` loops) and drive `continue` generation; `break_offset`
/// is the enclosing loop's exit; `before_list`/`after_list` delimit the
/// current sub-list for declarations and `if/else` joins; `after_body_loop`
/// marks the end of the enclosing loop body.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Scope {
    pub before_loop_entry: i32,
    pub loop_entry: i32,
    pub after_body_loop: i32,
    pub before_list: i32,
    pub after_list: i32,
    pub break_offset: i32,
}

impl Scope {
    fn top_level() -> Self {
        Scope {
            before_loop_entry: -1,
            loop_entry: -1,
            after_body_loop: -1,
            before_list: -1,
            after_list: -1,
            break_offset: -1,
        }
    }
}

/// Per-method analysis state shared by every pass.
pub(crate) struct Ctx<'a> {
    pub class: &'a mut ClassContext,
    pub reference_map: &'a mut ReferenceMap,
    pub local_variables: &'a mut LocalVariables,
    /// Raw code bytes, for goto-chain walking.
    pub code: &'a [u8],
    pub method_descriptor_index: u16,
    pub method_signature_index: u16,
    pub options: &'a StructureOptions,
    /// Jump targets that could not be rewritten; resolved into labels last.
    pub label_offsets: BTreeSet<i32>,
    /// Offset of the method's final `return`, -1 when it ends otherwise.
    pub return_offset: i32,
}

/// Analyze one method body. `list` is the decoded, offset-ordered statement
/// list; the result lands in `method.fast_nodes`. Errors never cross the
/// method boundary: on failure `method.contains_error` is set and the
/// partially analyzed nodes are kept.
pub fn build(
    reference_map: &mut ReferenceMap,
    class: &mut ClassContext,
    method: &mut Method,
    mut list: Vec<Instruction>,
    options: &StructureOptions,
) {
    if list.is_empty() {
        return;
    }

    let ranges = exception::aggregate_code_exceptions(&method.exception_table, &list);
    init_declaration_flags(&mut method.local_variables);

    let return_offset = match list.last() {
        Some(instruction) if matches!(instruction.op, Op::Return) => instruction.offset,
        _ => -1,
    };

    let mut ctx = Ctx {
        class,
        reference_map,
        local_variables: &mut method.local_variables,
        code: &method.code,
        method_descriptor_index: method.descriptor_index,
        method_signature_index: method.signature_index,
        options,
        label_offsets: BTreeSet::new(),
        return_offset,
    };

    let result = build_method(&mut ctx, &mut list, &ranges);
    method.fast_nodes = list;
    if result.is_err() {
        method.contains_error = true;
    }
}

fn build_method(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    ranges: &[exception::FastCodeException],
) -> Result<(), StructureError> {
    // Innermost regions first.
    for fce in ranges.iter().rev() {
        if fce.synchronized_flag {
            blocks::create_synchronized_block(ctx, list, fce)?;
        } else {
            blocks::create_fast_try(ctx, list, fce)?;
        }
    }

    reconstruct::execute_reconstructors(ctx, list);

    analyze_list(ctx, list, Scope::top_level())?;

    ctx.local_variables.remove_useless_local_variables();
    declarations::manage_redeclared_variables(list);
    labels::remove_synthetic_return(list, ctx.return_offset, ctx.return_offset);

    if !ctx.label_offsets.is_empty() {
        let offsets = ctx.label_offsets.clone();
        labels::add_labels(list, &offsets);
    }
    Ok(())
}

/// Parameters and `this` start declared; so do exception and return-address
/// slots, which never get a source-level declaration.
fn init_declaration_flags(local_variables: &mut LocalVariables) {
    let first_local = local_variables.index_of_first_local_variable();
    for i in 0..local_variables.len() {
        if let Some(lv) = local_variables.get_mut(i) {
            lv.declaration_flag = if i < first_local || lv.exception_or_return_address {
                DECLARED
            } else {
                NOT_DECLARED
            };
        }
    }
}

/// The per-list pipeline, applied recursively to every nested body.
pub(crate) fn analyze_list(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    scope: Scope,
) -> Result<(), StructureError> {
    loops::create_loops(ctx, list, scope)?;
    switches::create_switch(ctx, list, scope)?;
    analyze_try_and_synchronized(ctx, list, scope)?;
    // After comparison aggregation; needs declared variable types settled.
    reconstruct::ternary_in_return(list);
    conditionals::create_if_else(ctx, list, scope)?;
    labels::remove_nop_goto(list);
    declarations::add_declarations(ctx, list, scope.before_list);
    labels::remove_no_jump_goto(list, scope.after_list);
    labels::create_break_and_continue(ctx, list, scope)?;
    reconstruct::single_dup_load_cleanup(list);
    labels::remove_synthetic_return(list, scope.after_list, ctx.return_offset);
    labels::add_cast_instruction_on_return(ctx, list);
    Ok(())
}

/// Recurse into try/synchronized bodies built before loop analysis, and drop
/// the stray monitor instructions left by the empty-block special cases.
fn analyze_try_and_synchronized(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    scope: Scope,
) -> Result<(), StructureError> {
    let mut after_list_offset = scope.after_list;
    let mut index = list.len();
    while index > 0 {
        index -= 1;
        let before_list_offset =
            if index > 0 { list[index - 1].offset } else { scope.before_list };
        let current_offset = list[index].offset;
        let sub_scope = Scope {
            before_list: before_list_offset,
            after_list: after_list_offset,
            ..scope
        };

        // Stray monitor instructions only remain around the empty-block
        // special cases; they carry no structure.
        if matches!(list[index].op, Op::MonitorEnter { .. } | Op::MonitorExit { .. }) {
            list.remove(index);
            after_list_offset = current_offset;
            continue;
        }

        match &mut list[index].op {
            Op::Try { instructions, catches, finally_instructions, .. } => {
                analyze_list(ctx, instructions, sub_scope)?;
                for c in catches.iter_mut() {
                    analyze_list(ctx, &mut c.instructions, sub_scope)?;
                }
                if let Some(finally_instructions) = finally_instructions {
                    analyze_list(ctx, finally_instructions, sub_scope)?;
                }
            }
            Op::Synchronized { instructions, .. } => {
                analyze_list(ctx, instructions, sub_scope)?;
            }
            _ => {}
        }

        after_list_offset = current_offset;
    }
    Ok(())
}
