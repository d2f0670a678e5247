//! Protected-region building: try/catch, the jsr-form try/finally, and
//! synchronized blocks.

mod common;

use classfile_structurer::instruction::{Instruction, Op};
use classfile_structurer::types::CodeException;

use common::*;

fn invoke(offset: i32, line_number: i32, index: u16, receiver_slot: u16) -> Instruction {
    ins(
        offset,
        line_number,
        Op::Invokevirtual {
            index,
            objectref: Box::new(aload(offset - 1, line_number, receiver_slot)),
            args: vec![],
        },
    )
}

fn exception_load(offset: i32, slot: u16) -> Instruction {
    ins(offset, NO_LINE, Op::ExceptionLoad { exception_name_index: 0, index: slot })
}

fn typed_exception_load(offset: i32, name_index: u16, slot: u16) -> Instruction {
    ins(offset, NO_LINE, Op::ExceptionLoad { exception_name_index: name_index, index: slot })
}

// try { inTry(); } catch (Exception e) { inCatch(); }
#[test]
fn try_catch() {
    let mut pool = minimal_pool();
    let in_try = pool.add_method_ref("T", "inTry", "()V");
    let in_catch = pool.add_method_ref("T", "inCatch", "()V");
    let exception_class = pool.add_class("java/lang/Exception");

    let list = vec![
        invoke(1, 2, in_try, 0),
        goto(4, 2, 14),
        // e = <caught>; inCatch()
        astore(7, 3, 2, typed_exception_load(7, exception_class, 2)),
        invoke(10, 4, in_catch, 0),
        ret(14, 6),
    ];
    let mut class = class(pool);
    let mut method = method(vec![]);
    method.exception_table = vec![CodeException {
        start_pc: 0,
        end_pc: 4,
        handler_pc: 7,
        catch_type: exception_class,
    }];
    run(&mut class, &mut method, list);

    let nodes = &method.fast_nodes;
    assert_invariants(nodes);
    match &nodes[0].op {
        Op::Try { instructions, catches, finally_instructions, .. } => {
            assert_eq!(instructions.len(), 1, "try body keeps only the call");
            assert_eq!(catches.len(), 1);
            assert_eq!(catches[0].type_index, exception_class);
            assert_eq!(catches[0].var_index, 2);
            assert_eq!(catches[0].instructions.len(), 1, "binding astore is stripped");
            assert!(finally_instructions.is_none());
        }
        other => panic!("expected try/catch, got {:?}", other),
    }
}

// try { inTry(); } finally { cleanup(); } in the JDK 1.1 jsr/subroutine form.
// The finally body materializes once; every jsr and ret disappears.
#[test]
fn try_finally_jsr_subroutine() {
    let mut pool = minimal_pool();
    let in_try = pool.add_method_ref("T", "inTry", "()V");
    let cleanup = pool.add_method_ref("T", "cleanup", "()V");

    let list = vec![
        invoke(1, 2, in_try, 0),
        ins(4, 3, Op::Jsr { branch: 14 }),
        goto(7, 3, 24),
        // handler: e = <caught>; jsr; throw e
        astore(10, NO_LINE, 2, exception_load(10, 2)),
        ins(11, NO_LINE, Op::Jsr { branch: 7 }),
        ins(14, NO_LINE, Op::Athrow { value: Box::new(aload(13, NO_LINE, 2)) }),
        // subroutine: ra = <addr>; cleanup(); ret ra
        ins(18, NO_LINE, Op::AStore { index: 3, valueref: Box::new(ins(18, NO_LINE, Op::ReturnAddressLoad)) }),
        invoke(21, 4, cleanup, 0),
        ins(23, 4, Op::Ret { index: 3 }),
        ret(24, 5),
    ];
    let mut class = class(pool);
    let mut method = method(vec![]);
    let mut ra_slot = local_variable(3, 18, 6);
    ra_slot.exception_or_return_address = true;
    let mut exception_slot = local_variable(2, 10, 5);
    exception_slot.exception_or_return_address = true;
    method.local_variables =
        classfile_structurer::local_variables::LocalVariables::new(vec![exception_slot, ra_slot], 0);
    method.exception_table = vec![CodeException {
        start_pc: 0,
        end_pc: 4,
        handler_pc: 10,
        catch_type: 0,
    }];
    run(&mut class, &mut method, list);

    let nodes = &method.fast_nodes;
    assert_invariants(nodes);
    match &nodes[0].op {
        Op::Try { instructions, catches, finally_instructions, .. } => {
            assert_eq!(instructions.len(), 1, "jsr and goto are gone from the try body");
            assert!(catches.is_empty());
            let finally = finally_instructions.as_ref().expect("finally body");
            assert_eq!(finally.len(), 1, "finally keeps only the cleanup call");
            assert!(matches!(finally[0].op, Op::Invokevirtual { .. }));
        }
        other => panic!("expected try/finally, got {:?}", other),
    }
    // The return-address slot is purged.
    assert!(method.local_variables.with_index_and_offset(3, 18).is_none());
}

// synchronized (lock) { body(); } with the modern inline cleanup handler.
#[test]
fn synchronized_block() {
    let mut pool = minimal_pool();
    let body_ref = pool.add_method_ref("T", "body", "()V");

    let list = vec![
        // monitor = lock; monitorenter
        astore(1, 2, 2, aload(0, 2, 1)),
        ins(2, 2, Op::MonitorEnter { objectref: Box::new(aload(2, 2, 2)) }),
        invoke(4, 3, body_ref, 0),
        ins(6, 4, Op::MonitorExit { objectref: Box::new(aload(5, 4, 2)) }),
        goto(7, 4, 15),
        // handler: e = <caught>; monitorexit; throw e
        astore(10, NO_LINE, 3, exception_load(10, 3)),
        ins(12, NO_LINE, Op::MonitorExit { objectref: Box::new(aload(11, NO_LINE, 2)) }),
        ins(14, NO_LINE, Op::Athrow { value: Box::new(aload(13, NO_LINE, 3)) }),
        ret(15, 5),
    ];
    let mut class = class(pool);
    let mut method = method(vec![local_variable(2, 2, 13)]);
    method.exception_table = vec![
        CodeException { start_pc: 4, end_pc: 6, handler_pc: 10, catch_type: 0 },
        CodeException { start_pc: 10, end_pc: 14, handler_pc: 10, catch_type: 0 },
    ];
    run(&mut class, &mut method, list);

    let nodes = &method.fast_nodes;
    assert_invariants(nodes);
    match &nodes[0].op {
        Op::Synchronized { monitor, instructions, .. } => {
            assert!(matches!(monitor.op, Op::ALoad { index: 1 }), "monitor is the captured lock");
            assert_eq!(instructions.len(), 1, "body keeps only the call");
            assert!(matches!(instructions[0].op, Op::Invokevirtual { .. }));
        }
        other => panic!("expected synchronized block, got {:?}", other),
    }
    // The monitor slot is purged.
    assert!(method.local_variables.with_index_and_offset(2, 2).is_none());
}
