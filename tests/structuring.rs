//! Loop, conditional and jump-rewriting scenarios over the full pipeline.

mod common;

use classfile_structurer::instruction::{Cmp, Op};

use common::*;

// int i = 0; while (i < 10) { i++; }
//
//   0: iconst_0   1: istore_1   2: iload_1   3: bipush 10
//   5: if_icmpge 15   8: iinc 1 1   11: goto 2   15: return
#[test]
fn simple_while_loop() {
    let list = vec![
        istore(1, 1, 1, iconst(0, 1, 0)),
        if_cmp(5, 2, Cmp::Ge, iload(2, 2, 1), iconst(3, 2, 10), 15),
        iinc(8, 3, 1, 1),
        goto(11, 3, 2),
        ret(15, 1),
    ];
    let mut class = class(minimal_pool());
    let mut method = method(vec![local_variable(1, 1, 15)]);
    run(&mut class, &mut method, list);

    let nodes = &method.fast_nodes;
    assert_invariants(nodes);
    assert_eq!(nodes.len(), 2, "expected declaration + while, got {:?}", nodes);

    match &nodes[0].op {
        Op::Declare { lv_index: 1, store: Some(store), .. } => {
            assert!(matches!(store.op, Op::IStore { index: 1, .. }));
        }
        other => panic!("expected declaration, got {:?}", other),
    }
    match &nodes[1].op {
        Op::While { test, instructions, .. } => {
            // The exit test reads back in source polarity: i < 10.
            assert!(matches!(test.op, Op::IfCmp { cmp: Cmp::Lt, .. }));
            assert_eq!(instructions.len(), 1);
            assert!(matches!(instructions[0].op, Op::Iinc { index: 1, count: 1 }));
        }
        other => panic!("expected while loop, got {:?}", other),
    }
}

// do { i++; } while (i < 10);
#[test]
fn do_while_loop() {
    let list = vec![
        iinc(0, 1, 1, 1),
        if_cmp(4, 2, Cmp::Lt, iload(1, 2, 1), iconst(2, 2, 10), 0),
        ret(8, 3),
    ];
    let mut class = class(minimal_pool());
    let mut method = method(vec![]);
    run(&mut class, &mut method, list);

    let nodes = &method.fast_nodes;
    assert_invariants(nodes);
    match &nodes[0].op {
        Op::DoWhile { test, instructions, .. } => {
            // Bottom tests keep their polarity.
            assert!(matches!(test.op, Op::IfCmp { cmp: Cmp::Lt, .. }));
            assert_eq!(instructions.len(), 1);
        }
        other => panic!("expected do-while, got {:?}", other),
    }
}

// do {} while (cond) degenerates into while (cond) {}.
#[test]
fn empty_do_while_becomes_while() {
    let list = vec![
        if_cmp(3, 1, Cmp::Lt, iload(0, 1, 1), iconst(1, 1, 10), 0),
        ret(7, 2),
    ];
    let mut class = class(minimal_pool());
    let mut method = method(vec![]);
    run(&mut class, &mut method, list);

    let nodes = &method.fast_nodes;
    assert_invariants(nodes);
    match &nodes[0].op {
        Op::While { instructions, .. } => assert!(instructions.is_empty()),
        other => panic!("expected degenerate while, got {:?}", other),
    }
}

// for (String s : list) { println(s); } over the iterator protocol.
#[test]
fn foreach_iterator_pattern() {
    let mut pool = minimal_pool();
    let iterator_ref = pool.add_interface_method_ref("java/util/List", "iterator", "()Ljava/util/Iterator;");
    let has_next_ref = pool.add_interface_method_ref("java/util/Iterator", "hasNext", "()Z");
    let next_ref = pool.add_interface_method_ref("java/util/Iterator", "next", "()Ljava/lang/Object;");
    let string_class = pool.add_class("java/lang/String");
    let println_ref = pool.add_method_ref("java/io/PrintStream", "println", "(Ljava/lang/String;)V");
    let out_ref = pool.add_field_ref("java/lang/System", "out", "Ljava/io/PrintStream;");
    let string_sig = pool.add_utf8("Ljava/util/Iterator;");

    let list = vec![
        // it = list.iterator()
        astore(
            3,
            10,
            2,
            ins(
                1,
                10,
                Op::Invokeinterface {
                    index: iterator_ref,
                    objectref: Box::new(aload(0, 10, 1)),
                    args: vec![],
                },
            ),
        ),
        goto(7, 10, 19),
        // s = (String) it.next()
        astore(
            14,
            10,
            3,
            ins(
                13,
                10,
                Op::CheckCast {
                    index: string_class,
                    objectref: Box::new(ins(
                        11,
                        10,
                        Op::Invokeinterface {
                            index: next_ref,
                            objectref: Box::new(aload(10, 10, 2)),
                            args: vec![],
                        },
                    )),
                },
            ),
        ),
        // System.out.println(s)
        ins(
            18,
            11,
            Op::Invokevirtual {
                index: println_ref,
                objectref: Box::new(ins(15, 11, Op::GetStatic { index: out_ref })),
                args: vec![aload(17, 11, 3)],
            },
        ),
        // if (it.hasNext()) goto body
        if_test(
            19,
            10,
            Cmp::Ne,
            ins(
                19,
                10,
                Op::Invokeinterface {
                    index: has_next_ref,
                    objectref: Box::new(aload(19, 10, 2)),
                    args: vec![],
                },
            ),
            14,
        ),
        ret(23, 12),
    ];

    let mut class = class(pool);
    let mut method = method(vec![
        typed_local_variable(2, 3, 17, string_sig),
        local_variable(3, 14, 5),
    ]);
    run(&mut class, &mut method, list);

    let nodes = &method.fast_nodes;
    assert_invariants(nodes);
    match &nodes[0].op {
        Op::ForEach { variable, values, instructions, .. } => {
            assert!(
                matches!(variable.op, Op::Declare { lv_index: 3, store: None, .. }),
                "loop variable should be a bare declaration, got {:?}",
                variable
            );
            assert!(matches!(values.op, Op::ALoad { index: 1 }));
            assert_eq!(instructions.len(), 1, "body keeps only the println");
        }
        other => panic!("expected for-each, got {:?}", other),
    }
    // The synthetic iterator slot is purged.
    assert!(method.local_variables.with_index_and_offset(2, 3).is_none());
}

// if (a != 0) { x = 1; } else { x = 2; }
#[test]
fn if_else_recognition() {
    let list = vec![
        if_test(2, 1, Cmp::Eq, iload(0, 1, 1), 10),
        istore(6, 2, 2, iconst(5, 2, 1)),
        goto(7, 2, 14),
        istore(10, 4, 2, iconst(9, 4, 2)),
        ret(14, 6),
    ];
    let mut class = class(minimal_pool());
    let mut method = method(vec![]);
    run(&mut class, &mut method, list);

    let nodes = &method.fast_nodes;
    assert_invariants(nodes);
    match &nodes[0].op {
        Op::IfElse { test, instructions, else_instructions, .. } => {
            assert!(matches!(test.op, Op::If { cmp: Cmp::Ne, .. }), "test is inverted");
            assert_eq!(instructions.len(), 1);
            assert_eq!(else_instructions.len(), 1);
        }
        other => panic!("expected if-else, got {:?}", other),
    }
}

// A goto reaching the method-ending `iload_1; ireturn` duplicates the return
// and fuses with the same-slot store before it.
#[test]
fn goto_to_trailing_return_duplicates_and_fuses() {
    let list = vec![
        istore(0, NO_LINE, 1, iconst(0, NO_LINE, 5)),
        goto(2, NO_LINE, 10),
        istore(6, NO_LINE, 1, iconst(5, NO_LINE, 6)),
        xreturn(11, NO_LINE, iload(10, NO_LINE, 1)),
    ];
    let mut class = class(minimal_pool());
    let mut method = method(vec![]);
    // iconst_5; istore_1; goto 10; iconst_6(bipush); istore_1; iload_1; ireturn
    method.code = vec![0x08, 0x3c, 0xa7, 0x00, 0x08, 0x10, 0x06, 0x3c, 0x00, 0x00, 0x1b, 0xac];
    run(&mut class, &mut method, list);

    let nodes = &method.fast_nodes;
    assert_invariants(nodes);
    // The store+goto pair became `return 5;`.
    match &nodes[0].op {
        Op::XReturn { valueref } => {
            assert!(matches!(valueref.op, Op::IConst { value: 5, .. }));
        }
        other => panic!("expected fused return, got {:?}", other),
    }
}

// A forward jump that is neither break, continue nor return registers a
// label and becomes a labeled break.
#[test]
fn unresolvable_goto_becomes_labeled_break() {
    let list = vec![
        istore(0, 1, 1, iconst(0, 1, 0)),
        goto(2, 2, 8),
        istore(5, 2, 1, iconst(4, 2, 1)),
        istore(8, 3, 1, iconst(7, 3, 2)),
        ret(10, 4),
    ];
    let mut class = class(minimal_pool());
    let mut method = method(vec![local_variable(1, 0, 11)]);
    run(&mut class, &mut method, list);

    let nodes = &method.fast_nodes;
    assert_invariants(nodes);
    assert_eq!(
        count_nodes(nodes, &|n| matches!(n.op, Op::GotoLabeledBreak { target: 8 })),
        1
    );
    assert_eq!(count_nodes(nodes, &|n| matches!(n.op, Op::Label { .. })), 1);
}

// Declared variables have exactly one declaration in the finished tree.
#[test]
fn declaration_placed_once() {
    let list = vec![
        istore(1, 1, 1, iconst(0, 1, 0)),
        istore(4, 2, 1, iconst(3, 2, 7)),
        ret(6, 3),
    ];
    let mut class = class(minimal_pool());
    let mut method = method(vec![local_variable(1, 1, 6)]);
    run(&mut class, &mut method, list);

    let nodes = &method.fast_nodes;
    assert_invariants(nodes);
    assert_eq!(count_nodes(nodes, &|n| matches!(n.op, Op::Declare { .. })), 1);
    // The second store stays an assignment.
    assert_eq!(count_nodes(nodes, &|n| matches!(n.op, Op::IStore { .. })), 2);
}

// `int x = f(); return x;` fuses the store into the return and flags the
// variable for removal.
#[test]
fn store_return_fusion() {
    let list = vec![
        istore(1, 1, 1, iconst(0, 1, 41)),
        xreturn(3, 1, iload(2, 1, 1)),
    ];
    let mut class = class(minimal_pool());
    let mut method = method(vec![local_variable(1, 1, 3)]);
    run(&mut class, &mut method, list);

    let nodes = &method.fast_nodes;
    assert_invariants(nodes);
    assert_eq!(nodes.len(), 1);
    match &nodes[0].op {
        Op::XReturn { valueref } => {
            assert!(matches!(valueref.op, Op::IConst { value: 41, .. }));
        }
        other => panic!("expected fused return, got {:?}", other),
    }
    // The fused variable is gone from the table.
    assert!(method.local_variables.with_index_and_offset(1, 1).is_none());
}

// Running the pipeline again over already-structured output is a no-op
// (idempotence of the reconstructors on an analyzed list).
#[test]
fn pipeline_is_idempotent_on_structured_output() {
    let list = vec![
        istore(1, 1, 1, iconst(0, 1, 0)),
        if_cmp(5, 2, Cmp::Ge, iload(2, 2, 1), iconst(3, 2, 10), 15),
        iinc(8, 3, 1, 1),
        goto(11, 3, 2),
        ret(15, 1),
    ];
    let mut class = class(minimal_pool());
    let mut method = method(vec![local_variable(1, 1, 15)]);
    run(&mut class, &mut method, list);

    let first = format!("{:?}", method.fast_nodes);
    let reanalyzed = method.fast_nodes.clone();
    run(&mut class, &mut method, reanalyzed);
    assert_eq!(first, format!("{:?}", method.fast_nodes));
}
