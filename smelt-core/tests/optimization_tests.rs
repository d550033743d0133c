//! Peephole optimizer tests.
//!
//! Each test builds an instruction list by hand, runs the optimizer and
//! checks the rewritten shape, including the fixed-point and local-sweep
//! invariants.

use smelt_core::builder::FunctionBuilder;
use smelt_core::instr::{BinOp, Instruction, MemWidth, UnOp, Value};
use smelt_core::optimize::optimize_function;
use smelt_core::types::{Intrinsic, TypeSpec, ValueType};

fn builder_with_param(param: &str) -> FunctionBuilder {
    let mut b = FunctionBuilder::new("t", false);
    b.declare(
        param,
        TypeSpec::Intrinsic(Intrinsic::I32),
        ValueType::I32,
        true,
    );
    b
}

fn local(b: &mut FunctionBuilder, name: &str) {
    b.declare(
        name,
        TypeSpec::Intrinsic(Intrinsic::I32),
        ValueType::I32,
        false,
    );
}

fn add(ty: ValueType) -> Instruction {
    Instruction::Binary { ty, op: BinOp::Add }
}

#[test]
fn dead_code_after_return_is_dropped() {
    let mut b = builder_with_param("x");
    b.result = Some(ValueType::I32);
    b.instructions = vec![
        Instruction::LocalGet("x".into()),
        Instruction::Return,
        Instruction::i32_const(7),
        Instruction::Drop,
    ];
    optimize_function(&mut b).unwrap();
    assert_eq!(
        b.instructions,
        vec![Instruction::LocalGet("x".into()), Instruction::Return]
    );
}

#[test]
fn branch_only_if_cascades_to_nothing() {
    // block $x { const 1; if { br $x } }  →  br_if  →  br  →  empty block
    let mut b = builder_with_param("x");
    b.instructions = vec![Instruction::Block {
        label: "exit".into(),
        body: vec![
            Instruction::i32_const(1),
            Instruction::If {
                result: None,
                then_body: vec![Instruction::Br("exit".into())],
                else_body: vec![],
            },
        ],
    }];
    optimize_function(&mut b).unwrap();
    assert!(b.instructions.is_empty());
}

#[test]
fn constant_false_br_if_vanishes() {
    let mut b = builder_with_param("x");
    b.instructions = vec![Instruction::Block {
        label: "exit".into(),
        body: vec![
            Instruction::i32_const(0),
            Instruction::BrIf("exit".into()),
        ],
    }];
    optimize_function(&mut b).unwrap();
    assert!(b.instructions.is_empty());
}

#[test]
fn instruction_level_constant_fold() {
    let mut b = builder_with_param("x");
    b.instructions = vec![
        Instruction::i32_const(4),
        Instruction::i32_const(8),
        add(ValueType::I32),
        Instruction::Drop,
    ];
    optimize_function(&mut b).unwrap();
    assert_eq!(
        b.instructions,
        vec![Instruction::i32_const(12), Instruction::Drop]
    );
}

#[test]
fn additive_pair_fuses() {
    let mut b = builder_with_param("x");
    b.instructions = vec![
        Instruction::LocalGet("x".into()),
        Instruction::i32_const(4),
        add(ValueType::I32),
        Instruction::i32_const(8),
        add(ValueType::I32),
        Instruction::Drop,
    ];
    optimize_function(&mut b).unwrap();
    assert_eq!(
        b.instructions,
        vec![
            Instruction::LocalGet("x".into()),
            Instruction::i32_const(12),
            add(ValueType::I32),
            Instruction::Drop,
        ]
    );
}

#[test]
fn extend_of_constant_folds() {
    let mut b = builder_with_param("x");
    b.instructions = vec![
        Instruction::i32_const(-1),
        Instruction::Convert(smelt_core::instr::ConvOp::I64ExtendI32U),
        Instruction::Drop,
    ];
    optimize_function(&mut b).unwrap();
    assert_eq!(
        b.instructions,
        vec![Instruction::i64_const(0xffff_ffff), Instruction::Drop]
    );
}

#[test]
fn zero_add_identity_is_removed() {
    let mut b = builder_with_param("x");
    b.instructions = vec![
        Instruction::LocalGet("x".into()),
        Instruction::i32_const(0),
        add(ValueType::I32),
        Instruction::Drop,
    ];
    optimize_function(&mut b).unwrap();
    assert_eq!(
        b.instructions,
        vec![Instruction::LocalGet("x".into()), Instruction::Drop]
    );
}

#[test]
fn double_eqz_of_constant() {
    let mut b = builder_with_param("x");
    b.instructions = vec![
        Instruction::i32_const(5),
        Instruction::Unary {
            ty: ValueType::I32,
            op: UnOp::Eqz,
        },
        Instruction::Unary {
            ty: ValueType::I32,
            op: UnOp::Eqz,
        },
        Instruction::Drop,
    ];
    optimize_function(&mut b).unwrap();
    assert_eq!(
        b.instructions,
        vec![Instruction::i32_const(1), Instruction::Drop]
    );
}

#[test]
fn narrow_store_drops_mask() {
    let mut b = builder_with_param("x");
    b.instructions = vec![
        Instruction::i32_const(64),
        Instruction::LocalGet("x".into()),
        Instruction::i32_const(0xff),
        Instruction::Binary {
            ty: ValueType::I32,
            op: BinOp::And,
        },
        Instruction::Store {
            ty: ValueType::I32,
            width: MemWidth::W8,
            offset: 0,
        },
    ];
    optimize_function(&mut b).unwrap();
    assert_eq!(
        b.instructions,
        vec![
            Instruction::i32_const(64),
            Instruction::LocalGet("x".into()),
            Instruction::Store {
                ty: ValueType::I32,
                width: MemWidth::W8,
                offset: 0,
            },
        ]
    );
}

#[test]
fn load_offset_is_absorbed() {
    let mut b = builder_with_param("x");
    b.instructions = vec![
        Instruction::i32_const(100),
        Instruction::i32_const(8),
        add(ValueType::I32),
        Instruction::Load {
            ty: ValueType::F64,
            width: MemWidth::W64,
            signed: false,
            offset: 0,
        },
        Instruction::Drop,
    ];
    optimize_function(&mut b).unwrap();
    assert_eq!(
        b.instructions,
        vec![
            Instruction::i32_const(100),
            Instruction::Load {
                ty: ValueType::F64,
                width: MemWidth::W64,
                signed: false,
                offset: 8,
            },
            Instruction::Drop,
        ]
    );
}

#[test]
fn store_offset_is_absorbed() {
    let mut b = builder_with_param("x");
    b.instructions = vec![
        Instruction::i32_const(100),
        Instruction::i32_const(4),
        add(ValueType::I32),
        Instruction::LocalGet("x".into()),
        Instruction::Store {
            ty: ValueType::I32,
            width: MemWidth::W32,
            offset: 0,
        },
    ];
    optimize_function(&mut b).unwrap();
    assert_eq!(
        b.instructions,
        vec![
            Instruction::i32_const(100),
            Instruction::LocalGet("x".into()),
            Instruction::Store {
                ty: ValueType::I32,
                width: MemWidth::W32,
                offset: 4,
            },
        ]
    );
}

#[test]
fn negative_offsets_are_not_absorbed() {
    let mut b = builder_with_param("x");
    let original = vec![
        Instruction::i32_const(100),
        Instruction::i32_const(-8),
        add(ValueType::I32),
        Instruction::Load {
            ty: ValueType::I32,
            width: MemWidth::W32,
            signed: false,
            offset: 0,
        },
        Instruction::Drop,
    ];
    b.instructions = original;
    optimize_function(&mut b).unwrap();
    // The constant fold still collapses the address; no offset= appears.
    assert_eq!(
        b.instructions,
        vec![
            Instruction::i32_const(92),
            Instruction::Load {
                ty: ValueType::I32,
                width: MemWidth::W32,
                signed: false,
                offset: 0,
            },
            Instruction::Drop,
        ]
    );
}

#[test]
fn set_get_becomes_tee_and_single_use_tee_dies() {
    let mut b = builder_with_param("x");
    local(&mut b, "t");
    b.result = Some(ValueType::I32);
    b.instructions = vec![
        Instruction::LocalGet("x".into()),
        Instruction::LocalSet("t".into()),
        Instruction::LocalGet("t".into()),
        Instruction::Return,
    ];
    optimize_function(&mut b).unwrap();
    assert_eq!(
        b.instructions,
        vec![Instruction::LocalGet("x".into()), Instruction::Return]
    );
    // The sweep drops the now-unreferenced local.
    assert!(b.lookup("t").is_none());
    assert!(b.lookup("x").is_some());
}

#[test]
fn surviving_tee_keeps_its_local() {
    let mut b = builder_with_param("x");
    local(&mut b, "t");
    b.result = Some(ValueType::I32);
    b.instructions = vec![
        Instruction::LocalGet("x".into()),
        Instruction::LocalSet("t".into()),
        Instruction::LocalGet("t".into()),
        Instruction::LocalGet("t".into()),
        add(ValueType::I32),
        Instruction::Return,
    ];
    optimize_function(&mut b).unwrap();
    assert!(b
        .instructions
        .contains(&Instruction::LocalTee("t".into())));
    assert!(b.lookup("t").is_some());
    // The optimizer's contract: no local.set immediately followed by
    // local.get of the same local.
    for window in b.instructions.windows(2) {
        if let (Instruction::LocalSet(a), Instruction::LocalGet(c)) = (&window[0], &window[1]) {
            assert_ne!(a, c);
        }
    }
}

#[test]
fn constant_duplicates_through_tee() {
    let mut b = builder_with_param("x");
    local(&mut b, "t");
    b.instructions = vec![
        Instruction::i32_const(5),
        Instruction::LocalSet("t".into()),
        Instruction::LocalGet("t".into()),
        Instruction::LocalGet("t".into()),
        Instruction::Drop,
        Instruction::Drop,
    ];
    optimize_function(&mut b).unwrap();
    assert_eq!(
        b.instructions,
        vec![
            Instruction::i32_const(5),
            Instruction::i32_const(5),
            Instruction::Drop,
            Instruction::Drop,
        ]
    );
    assert!(b.lookup("t").is_none());
}

#[test]
fn loop_without_self_branch_is_peeled() {
    let mut b = builder_with_param("x");
    b.instructions = vec![Instruction::Loop {
        label: "l".into(),
        body: vec![Instruction::i32_const(1), Instruction::Drop],
    }];
    optimize_function(&mut b).unwrap();
    assert_eq!(
        b.instructions,
        vec![Instruction::i32_const(1), Instruction::Drop]
    );
}

#[test]
fn looping_loop_is_kept() {
    let mut b = builder_with_param("x");
    let body = vec![Instruction::Block {
        label: "exit".into(),
        body: vec![Instruction::Loop {
            label: "top".into(),
            body: vec![
                Instruction::LocalGet("x".into()),
                Instruction::BrIf("exit".into()),
                Instruction::Br("top".into()),
            ],
        }],
    }];
    b.instructions = body.clone();
    optimize_function(&mut b).unwrap();
    assert_eq!(b.instructions, body);
}

#[test]
fn block_with_top_level_exit_is_peeled() {
    let mut b = builder_with_param("x");
    b.instructions = vec![Instruction::Block {
        label: "b".into(),
        body: vec![
            Instruction::i32_const(1),
            Instruction::Drop,
            Instruction::Br("b".into()),
        ],
    }];
    optimize_function(&mut b).unwrap();
    assert_eq!(
        b.instructions,
        vec![Instruction::i32_const(1), Instruction::Drop]
    );
}

#[test]
fn forward_substitution_of_stable_source() {
    let mut b = builder_with_param("x");
    local(&mut b, "p");
    b.result = Some(ValueType::I32);
    // Simulates an inlined call site: the argument is set once, read once.
    b.instructions = vec![
        Instruction::LocalGet("x".into()),
        Instruction::LocalSet("p".into()),
        Instruction::i32_const(2),
        Instruction::LocalGet("p".into()),
        add(ValueType::I32),
        Instruction::Return,
    ];
    optimize_function(&mut b).unwrap();
    assert_eq!(
        b.instructions,
        vec![
            Instruction::i32_const(2),
            Instruction::LocalGet("x".into()),
            add(ValueType::I32),
            Instruction::Return,
        ]
    );
    assert!(b.lookup("p").is_none());
}

#[test]
fn optimizer_reaches_a_fixed_point() {
    let mut b = builder_with_param("x");
    local(&mut b, "t");
    b.result = Some(ValueType::I32);
    b.instructions = vec![
        Instruction::LocalGet("x".into()),
        Instruction::i32_const(0),
        add(ValueType::I32),
        Instruction::LocalSet("t".into()),
        Instruction::LocalGet("t".into()),
        Instruction::Return,
        Instruction::Const(Value::I32(99)),
    ];
    optimize_function(&mut b).unwrap();
    let once = b.instructions.clone();
    optimize_function(&mut b).unwrap();
    assert_eq!(b.instructions, once);
}
