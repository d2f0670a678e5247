//! Aggregation of raw `exception_table` entries into logical protected
//! regions.
//!
//! Entries sharing a `(start_pc, end_pc)` span merge into one region with an
//! ordered catch list; a catch-all entry is classified as the region's
//! `finally` handler or as the cleanup handler of a `synchronized` block.
//! Regions come out ordered outermost-first so that the driver's reverse
//! iteration builds inner blocks before the blocks that contain them.

use std::collections::BTreeMap;

use crate::instruction::{Instruction, Op};
use crate::types::CodeException;

/// How the catch-all handler of a region was generated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeKind {
    /// Plain try/catch, no catch-all handler (also the fallback for handler
    /// shapes we do not recognize).
    Catch,
    /// try/finally with the finally body duplicated inline (javac >= 1.4.2).
    Finally,
    /// try/finally sharing the finally body through a `jsr` subroutine
    /// (JDK 1.1-style).
    FinallySubroutine,
    /// Two nested monitor regions sharing their cleanup subroutines
    /// (JDK 1.1.8 double-synchronized shape).
    SynchronizedDouble,
}

#[derive(Clone, Debug)]
pub struct FastExceptionCatch {
    pub from_offset: i32,
    /// Constant pool index of the caught class.
    pub type_index: u16,
    /// Further types merged from a multi-catch.
    pub other_type_indexes: Vec<u16>,
}

/// One aggregated protected region.
#[derive(Clone, Debug)]
pub struct FastCodeException {
    pub kind: RangeKind,
    pub try_from_offset: i32,
    pub try_to_offset: i32,
    /// Handler offset of the catch-all (finally or monitor cleanup), -1 when
    /// the region has none.
    pub finally_from_offset: i32,
    /// First offset after the whole construct, -1 when it runs to the end of
    /// the current list.
    pub after_offset: i32,
    pub catches: Vec<FastExceptionCatch>,
    pub synchronized_flag: bool,
}

/// Merge the raw table into ordered regions.
pub fn aggregate_code_exceptions(
    exception_table: &[CodeException],
    list: &[Instruction],
) -> Vec<FastCodeException> {
    // Group by protected span, preserving handler order.
    let mut groups: BTreeMap<(i32, i32), Vec<CodeException>> = BTreeMap::new();
    for entry in exception_table {
        groups.entry((entry.start_pc, entry.end_pc)).or_default().push(*entry);
    }

    let mut ranges: Vec<FastCodeException> = Vec::with_capacity(groups.len());

    for ((start_pc, end_pc), entries) in &groups {
        // The entry protecting a handler against itself belongs to the region
        // that owns the handler, not to a region of its own.
        if entries.iter().all(|e| e.handler_pc <= e.start_pc) {
            continue;
        }
        let mut catches: Vec<FastExceptionCatch> = Vec::new();
        let mut catch_all: Option<i32> = None;

        for entry in entries {
            if entry.catch_type == 0 {
                // Entries protecting the handler itself repeat the catch-all;
                // the first one wins.
                if catch_all.is_none() {
                    catch_all = Some(entry.handler_pc);
                }
                continue;
            }
            let from_offset = node_offset_at_or_after(list, entry.handler_pc);
            if let Some(previous) = catches.iter_mut().find(|c| c.from_offset == from_offset) {
                previous.other_type_indexes.push(entry.catch_type);
            } else {
                catches.push(FastExceptionCatch {
                    from_offset,
                    type_index: entry.catch_type,
                    other_type_indexes: Vec::new(),
                });
            }
        }

        let mut range = FastCodeException {
            kind: RangeKind::Catch,
            try_from_offset: node_offset_at_or_after(list, *start_pc),
            try_to_offset: *end_pc,
            finally_from_offset: -1,
            after_offset: -1,
            catches,
            synchronized_flag: false,
        };

        if let Some(handler_pc) = catch_all {
            classify_catch_all(&mut range, list, handler_pc);
        }

        range.after_offset = compute_after_offset(&range, list);
        ranges.push(range);
    }

    // Outermost first: earlier start, then wider span.
    ranges.sort_by(|a, b| {
        a.try_from_offset
            .cmp(&b.try_from_offset)
            .then(b.try_to_offset.cmp(&a.try_to_offset))
    });
    ranges
}

/// Offsets in the raw table may point into the middle of a folded expression;
/// resolve to the first statement node at or after the pc.
fn node_offset_at_or_after(list: &[Instruction], pc: i32) -> i32 {
    list.iter().find(|i| i.offset >= pc).map(|i| i.offset).unwrap_or(pc)
}

/// Decide whether a catch-all handler is a finally body or the cleanup
/// handler of a synchronized block, and which vendor shape produced it.
/// Unknown shapes leave the region as a plain catch.
fn classify_catch_all(range: &mut FastCodeException, list: &[Instruction], handler_pc: i32) {
    let handler_start = node_offset_at_or_after(list, handler_pc);
    let handler_index = match list.iter().position(|i| i.offset >= handler_pc) {
        Some(i) => i,
        None => return,
    };

    let handler = &list[handler_index..];

    if is_monitor_cleanup(handler) {
        range.synchronized_flag = true;
        range.finally_from_offset = handler_start;

        let subroutine_ret = handler.iter().any(|i| matches!(i.op, Op::Ret { .. }));
        if subroutine_ret {
            let jsr_targets = distinct_jsr_targets(list, range.try_from_offset, handler_start);
            range.kind = if jsr_targets >= 2 {
                RangeKind::SynchronizedDouble
            } else {
                RangeKind::FinallySubroutine
            };
        } else {
            range.kind = RangeKind::Finally;
        }
        return;
    }

    if is_finally_handler(handler) {
        range.finally_from_offset = handler_start;
        let uses_subroutine = list
            .iter()
            .take(handler_index)
            .filter(|i| i.offset >= range.try_from_offset)
            .any(|i| matches!(i.op, Op::Jsr { .. }));
        range.kind = if uses_subroutine { RangeKind::FinallySubroutine } else { RangeKind::Finally };
    }
    // Anything else: leave as a plain catch (unknown handler shape).
}

/// `monitorexit` on a stashed slot followed by a rethrow (or a `ret` for the
/// subroutine form).
fn is_monitor_cleanup(handler: &[Instruction]) -> bool {
    let mut saw_monitor_exit = false;
    for instruction in handler.iter().take(4) {
        match &instruction.op {
            Op::AStore { valueref, .. }
                if matches!(valueref.op, Op::ExceptionLoad { .. } | Op::ReturnAddressLoad) => {}
            Op::MonitorExit { .. } => saw_monitor_exit = true,
            Op::Athrow { .. } | Op::Ret { .. } => return saw_monitor_exit,
            _ => return false,
        }
    }
    false
}

/// Catch-all storing the exception, running cleanup, and rethrowing the
/// stored exception.
fn is_finally_handler(handler: &[Instruction]) -> bool {
    let stored_slot = match handler.first() {
        Some(Instruction { op: Op::AStore { index, valueref }, .. })
            if matches!(valueref.op, Op::ExceptionLoad { .. }) =>
        {
            *index
        }
        _ => return false,
    };

    for instruction in handler.iter().skip(1) {
        match &instruction.op {
            Op::Athrow { value } => {
                let rethrows_stored = match &value.op {
                    Op::ALoad { index } => *index == stored_slot,
                    Op::ExceptionLoad { .. } => true,
                    _ => false,
                };
                if rethrows_stored {
                    return true;
                }
            }
            Op::Ret { .. } => return true,
            _ => {}
        }
    }
    false
}

fn distinct_jsr_targets(list: &[Instruction], from_offset: i32, to_offset: i32) -> usize {
    let mut targets: Vec<i32> = list
        .iter()
        .filter(|i| i.offset >= from_offset && i.offset < to_offset)
        .filter_map(|i| match i.op {
            Op::Jsr { .. } => i.jump_offset(),
            _ => None,
        })
        .collect();
    targets.sort_unstable();
    targets.dedup();
    targets.len()
}

/// First offset after the whole construct: the try-epilogue `goto` target
/// when one jumps past every handler, else the offset following the last
/// handler's terminator, else -1 (construct ends the list).
fn compute_after_offset(range: &FastCodeException, list: &[Instruction]) -> i32 {
    let mut handler_starts: Vec<i32> = range.catches.iter().map(|c| c.from_offset).collect();
    if range.finally_from_offset != -1 {
        handler_starts.push(range.finally_from_offset);
    }
    let first_handler = match handler_starts.iter().min() {
        Some(min) => *min,
        None => return -1,
    };
    let last_handler = *handler_starts.iter().max().unwrap_or(&first_handler);

    // Try epilogue: the forward goto jumping over the handlers.
    if let Some(epilogue) = list.iter().rev().find(|i| i.offset < first_handler) {
        if matches!(epilogue.op, Op::Goto { .. }) {
            if let Some(target) = epilogue.jump_offset() {
                if target > last_handler {
                    return target;
                }
            }
        }
    }

    // Escape goto inside a handler body (catch epilogue jumping to the join).
    let mut min_escape = -1;
    for instruction in list.iter().filter(|i| i.offset >= first_handler) {
        if let Op::Goto { .. } = instruction.op {
            if let Some(target) = instruction.jump_offset() {
                if target > last_handler
                    && target > instruction.offset
                    && (min_escape == -1 || target < min_escape)
                {
                    min_escape = target;
                }
            }
        }
    }
    if min_escape != -1 {
        // Only a join strictly after the last handler's own code counts.
        if list.iter().any(|i| i.offset == min_escape) {
            return min_escape;
        }
    }

    // Handler runs to a terminator; the construct ends with it.
    let mut previous: Option<&Instruction> = None;
    for instruction in list.iter().filter(|i| i.offset >= last_handler) {
        if let Some(p) = previous {
            if matches!(p.op, Op::Athrow { .. } | Op::Ret { .. }) {
                return instruction.offset;
            }
        }
        previous = Some(instruction);
    }
    -1
}
