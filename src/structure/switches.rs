//! `tableswitch`/`lookupswitch` recognition, including the enum-ordinal and
//! string-hash lowerings.

use crate::error::StructureError;
use crate::instruction::{CasePair, Cmp, Instruction, Op, SwitchKind, UNKNOWN_LINE_NUMBER};

use super::util::search_min_escape_offset;
use super::{analyze_list, Ctx, Scope};

pub(crate) fn create_switch(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    scope: Scope,
) -> Result<(), StructureError> {
    let mut index = 0;
    while index < list.len() {
        if matches!(list[index].op, Op::Switch { .. }) {
            index = analyze_switch(ctx, list, scope, index)?;
        }
        index += 1;
    }
    Ok(())
}

fn analyze_switch(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    scope: Scope,
    mut switch_index: usize,
) -> Result<usize, StructureError> {
    let switch_instruction = list.remove(switch_index);
    let switch_offset = switch_instruction.offset;
    let switch_line = switch_instruction.line_number;
    let (mut key, default_offset, keys, offsets) = match switch_instruction.op {
        Op::Switch { key, default_offset, keys, offsets } => (key, default_offset, keys, offsets),
        _ => return Err(StructureError::UnexpectedInstruction { offset: switch_offset }),
    };

    // Interleave the default at its jump position.
    let pair_length = keys.len();
    let mut pairs: Vec<CasePair> = Vec::with_capacity(pair_length + 1);
    let mut default_flag = true;
    for i in 0..pair_length {
        if default_flag && offsets[i] > default_offset {
            pairs.push(CasePair {
                is_default: true,
                key: 0,
                offset: switch_offset + default_offset,
                instructions: None,
            });
            default_flag = false;
        }
        pairs.push(CasePair {
            is_default: false,
            key: keys[i],
            offset: switch_offset + offsets[i],
            instructions: None,
        });
    }
    if default_flag {
        pairs.push(CasePair {
            is_default: true,
            key: 0,
            offset: switch_offset + default_offset,
            instructions: None,
        });
    }
    pairs.sort_by_key(|p| p.offset);

    let mut kind = if ctx.options.desugar_enum_switch {
        enum_switch_kind(ctx, &mut key)
    } else {
        SwitchKind::Plain
    };

    if ctx.options.desugar_string_switch
        && ctx.class.major_version >= 51
        && kind == SwitchKind::Plain
        && matches!(key.op, Op::ILoad { .. })
        && switch_index > 2
        && analyze_switch_string(ctx, list, switch_index, &mut key, &mut pairs)
    {
        // Drop the hash switch and both synthetic stores.
        list.remove(switch_index - 1);
        list.remove(switch_index - 2);
        list.remove(switch_index - 3);
        switch_index -= 3;
        kind = SwitchKind::String;
    }

    extract_cases(ctx, list, scope, switch_index, kind, switch_offset, switch_line, key, pairs)
}

/// Detect the `$SwitchMap$Enum[scrutinee.ordinal()]` lowering. On a match the
/// key is replaced by the original enum scrutinee.
fn enum_switch_kind(ctx: &Ctx, key: &mut Box<Instruction>) -> SwitchKind {
    let (array_source_name_index, indexref) = match &key.op {
        Op::ArrayLoad { arrayref, indexref, .. } => match &arrayref.op {
            Op::GetStatic { index } => {
                match ctx.class.constant_pool.ref_name_index(*index) {
                    Some(name_index) => (name_index, indexref),
                    None => return SwitchKind::Plain,
                }
            }
            // Eclipse routes the map through a synthetic static method of the
            // current class.
            Op::Invokestatic { index, args } if args.is_empty() => {
                let same_class = ctx.class.constant_pool.ref_class_index(*index)
                    == Some(ctx.class.this_class);
                match (same_class, ctx.class.constant_pool.ref_name_index(*index)) {
                    (true, Some(name_index)) => (name_index, indexref),
                    _ => return SwitchKind::Plain,
                }
            }
            _ => return SwitchKind::Plain,
        },
        _ => return SwitchKind::Plain,
    };

    if !ctx.class.switch_maps.contains_key(&array_source_name_index) {
        return SwitchKind::Plain;
    }

    let scrutinee = match &indexref.op {
        Op::Invokevirtual { index, objectref, args } if args.is_empty() => {
            match ctx.class.constant_pool.resolve_ref(*index) {
                Some((_, "ordinal", _)) => objectref.as_ref().clone(),
                _ => return SwitchKind::Plain,
            }
        }
        _ => return SwitchKind::Plain,
    };

    // Keep only the original enum scrutinee.
    **key = scrutinee;
    SwitchKind::Enum
}

/// Detect the javac 7 string lowering: a hash switch filling a synthetic int
/// slot guarded by `equals` tests, followed by the real switch on that slot.
/// On a match the case keys become string constant indexes and the key
/// becomes the original string expression.
fn analyze_switch_string(
    ctx: &mut Ctx,
    list: &[Instruction],
    switch_index: usize,
    key: &mut Box<Instruction>,
    pairs: &mut [CasePair],
) -> bool {
    let astore = &list[switch_index - 3];
    let (string_slot, string_value) = match &astore.op {
        Op::AStore { index, valueref } if astore.line_number == key.line_number => {
            (*index, valueref)
        }
        _ => return false,
    };
    let istore = &list[switch_index - 2];
    let index_slot = match &istore.op {
        Op::IStore { index, .. } if istore.line_number == astore.line_number => *index,
        _ => return false,
    };
    let hash_switch = &list[switch_index - 1];
    let (hash_test, hash_pairs) = match &hash_switch.op {
        Op::FastSwitch { kind: SwitchKind::Plain, test, pairs, .. }
            if hash_switch.line_number == astore.line_number =>
        {
            (test, pairs)
        }
        _ => return false,
    };

    // The outer switch scrutinizes tmp.hashCode().
    let hash_call_index = match &hash_test.op {
        Op::Invokevirtual { index, objectref, args } if args.is_empty() => {
            match objectref.op {
                Op::ALoad { index: receiver } if receiver == string_slot => *index,
                _ => return false,
            }
        }
        _ => return false,
    };
    let hash_class_index = match ctx.class.constant_pool.ref_class_index(hash_call_index) {
        Some(i) => i,
        None => return false,
    };
    match ctx.class.constant_pool.resolve_ref(hash_call_index) {
        Some(("java/lang/String", "hashCode", "()I")) => {}
        _ => return false,
    }

    let switch_slot = match key.op {
        Op::ILoad { index } => index,
        _ => return false,
    };
    if index_slot != switch_slot || hash_pairs.is_empty() {
        return false;
    }

    // Every non-default hash case assigns the slot under an equals guard.
    let mut string_indexes: std::collections::HashMap<i32, i32> = std::collections::HashMap::new();
    for pair in hash_pairs.iter().filter(|p| !p.is_default) {
        let mut instructions: &[Instruction] = match &pair.instructions {
            Some(instructions) => instructions,
            None => return false,
        };
        loop {
            let Some(first) = instructions.first() else {
                return false;
            };
            match &first.op {
                Op::IfSimple { test, instructions: body, .. } => {
                    match instructions.len() {
                        1 => {}
                        2 if matches!(instructions[1].op, Op::GotoBreak) => {}
                        _ => return false,
                    }
                    if body.len() != 1
                        || !record_equals_guard(
                            ctx,
                            hash_class_index,
                            switch_slot,
                            string_slot,
                            &mut string_indexes,
                            test,
                            &body[0],
                            Cmp::Ne,
                        )
                    {
                        return false;
                    }
                    break;
                }
                Op::IfElse { test, instructions: body, else_instructions, .. }
                    if instructions.len() == 1 =>
                {
                    if body.len() != 1
                        || !record_equals_guard(
                            ctx,
                            hash_class_index,
                            switch_slot,
                            string_slot,
                            &mut string_indexes,
                            test,
                            &body[0],
                            Cmp::Ne,
                        )
                    {
                        return false;
                    }
                    instructions = else_instructions;
                }
                _ => return false,
            }
        }
    }

    // Rewrite integer case keys into string constant indexes.
    for pair in pairs.iter_mut().filter(|p| !p.is_default) {
        match string_indexes.get(&pair.key) {
            Some(string_index) => pair.key = *string_index,
            None => return false,
        }
    }

    ctx.local_variables.remove_with_index_and_offset(switch_slot, key.offset);
    ctx.local_variables.remove_with_index_and_offset(string_slot, astore.offset);
    **key = string_value.as_ref().clone();
    true
}

/// One `if (!tmp.equals("lit")) ... else idx = N` guard of the hash switch.
#[allow(clippy::too_many_arguments)]
fn record_equals_guard(
    ctx: &Ctx,
    hash_class_index: u16,
    switch_slot: u16,
    string_slot: u16,
    string_indexes: &mut std::collections::HashMap<i32, i32>,
    test: &Instruction,
    value: &Instruction,
    cmp: Cmp,
) -> bool {
    let assigned = match &value.op {
        Op::IStore { index, valueref } if *index == switch_slot => match &valueref.op {
            Op::IConst { value, .. } => *value,
            _ => return false,
        },
        _ => return false,
    };

    let equals_call = match &test.op {
        Op::If { cmp: test_cmp, value, .. } if *test_cmp == cmp => value,
        _ => return false,
    };
    let (call_index, ldc_index) = match &equals_call.op {
        Op::Invokevirtual { index, objectref, args } if args.len() == 1 => {
            match (&objectref.op, &args[0].op) {
                (Op::ALoad { index: receiver }, Op::Ldc { index: ldc })
                    if *receiver == string_slot =>
                {
                    (*index, *ldc)
                }
                _ => return false,
            }
        }
        _ => return false,
    };
    if ctx.class.constant_pool.ref_class_index(call_index) != Some(hash_class_index) {
        return false;
    }
    match ctx.class.constant_pool.resolve_ref(call_index) {
        Some((_, "equals", "(Ljava/lang/Object;)Z")) => {}
        _ => return false,
    }

    string_indexes.insert(assigned, ldc_index as i32);
    true
}

/// Extract each case body up to the next case's target, rewrite trailing
/// gotos into breaks, recursively analyze every body, and splice the final
/// switch node in.
#[allow(clippy::too_many_arguments)]
fn extract_cases(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    scope: Scope,
    switch_index: usize,
    kind: SwitchKind,
    switch_offset: i32,
    switch_line: i32,
    key: Box<Instruction>,
    mut pairs: Vec<CasePair>,
) -> Result<usize, StructureError> {
    let pair_length = pairs.len() - 1;
    let mut break_offset = -1;
    let mut last_switch_offset = switch_offset;
    let index = switch_index;

    if index < list.len() {
        for i in 0..pair_length {
            let before_case_offset = last_switch_offset;
            let after_case_offset = pairs[i + 1].offset;
            let mut instructions: Option<Vec<Instruction>> = None;

            while index < list.len() && list[index].offset < after_case_offset {
                let instruction = list.remove(index);
                last_switch_offset = instruction.offset;
                instructions.get_or_insert_with(Vec::new).push(instruction);
            }

            if let Some(instructions) = &mut instructions {
                if !instructions.is_empty() {
                    let break_offset_tmp = search_min_escape_offset(
                        instructions,
                        before_case_offset,
                        last_switch_offset,
                    );
                    if break_offset_tmp != -1
                        && (break_offset == -1 || break_offset > break_offset_tmp)
                    {
                        break_offset = break_offset_tmp;
                    }
                    rewrite_trailing_goto_break(instructions);
                }
            }
            pairs[i].instructions = instructions;
        }

        // The block after the last case runs to the smallest escape.
        if break_offset != -1 {
            let mut after_switch_offset = if break_offset >= switch_offset {
                break_offset
            } else {
                list.last().map(|i| i.offset + 1).unwrap_or(break_offset)
            };

            for instruction in list.iter() {
                let is_branch = instruction.is_conditional_branch()
                    || matches!(instruction.op, Op::Goto { .. } | Op::FastSwitch { .. });
                if is_branch {
                    if let Some(jump_offset) = instruction.jump_offset() {
                        if last_switch_offset < jump_offset && jump_offset < after_switch_offset {
                            after_switch_offset = jump_offset;
                        }
                    }
                }
            }

            let mut instructions: Option<Vec<Instruction>> = None;
            while index < list.len() && list[index].offset < after_switch_offset {
                let instruction = list.remove(index);
                last_switch_offset = instruction.offset;
                instructions.get_or_insert_with(Vec::new).push(instruction);
            }
            if let Some(instructions) = &mut instructions {
                rewrite_trailing_goto_break(instructions);
            }
            pairs[pair_length].instructions = instructions;
        }

        // Recursive analysis of every extracted body.
        let mut before_list_offset = key.offset;
        let after_list_offset =
            if index < list.len() { list[index].offset } else { scope.after_list };

        for pair in pairs.iter_mut() {
            let Some(instructions) = &mut pair.instructions else {
                continue;
            };
            if instructions.is_empty() {
                continue;
            }
            let body_scope = Scope {
                before_list: before_list_offset,
                after_list: after_list_offset,
                break_offset,
                ..scope
            };
            let trailing_break = matches!(instructions.last().map(|i| &i.op), Some(Op::GotoBreak));
            if trailing_break {
                let saved = instructions.pop();
                analyze_list(ctx, instructions, body_scope)?;
                if let Some(saved) = saved {
                    instructions.push(saved);
                }
            } else {
                analyze_list(ctx, instructions, body_scope)?;
                // A body ending in a jump that leaves the switch still needs
                // an explicit break.
                if let Some(last) = instructions.last() {
                    let is_branch = last.is_conditional_branch()
                        || matches!(
                            last.op,
                            Op::Goto { .. }
                                | Op::IfSimple { .. }
                                | Op::IfElse { .. }
                                | Op::FastSwitch { .. }
                        );
                    if is_branch {
                        if let Some(jump_offset) = last.jump_offset() {
                            if jump_offset < switch_offset || last_switch_offset < jump_offset {
                                instructions.push(Instruction::new(
                                    last_switch_offset + 1,
                                    UNKNOWN_LINE_NUMBER,
                                    Op::GotoBreak,
                                ));
                            }
                        }
                    }
                }
            }
            if let Some(last) = pair.instructions.as_ref().and_then(|v| v.last()) {
                before_list_offset = last.offset;
            }
        }
    }

    let branch = if break_offset == -1 { 1 } else { break_offset - last_switch_offset };
    let node = Instruction::new(
        last_switch_offset,
        switch_line,
        Op::FastSwitch { kind, test: key, branch, pairs },
    );
    list.insert(switch_index, node);
    Ok(switch_index)
}

fn rewrite_trailing_goto_break(instructions: &mut [Instruction]) {
    let len = instructions.len();
    if len == 0 {
        return;
    }
    if matches!(instructions[len - 1].op, Op::Goto { .. }) {
        let mut line_number = instructions[len - 1].line_number;
        if len <= 1 || instructions[len - 2].line_number == line_number {
            line_number = UNKNOWN_LINE_NUMBER;
        }
        let offset = instructions[len - 1].offset;
        instructions[len - 1] = Instruction::new(offset, line_number, Op::GotoBreak);
    }
}
