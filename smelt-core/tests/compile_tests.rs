//! End-to-end compilation tests: parsed tree in, optimized instruction list
//! and rendered WAT out. The rendered text is machine-validated with the
//! `wat`/`wasmparser` pair.

use smelt_core::ast::ModuleAst;
use smelt_core::instr::{BinOp, Instruction, MemWidth};
use smelt_core::{render, Compiler, ErrorCode, ValueType};

fn compile(json: &str) -> (smelt_core::CompiledModule, Compiler) {
    let ast: ModuleAst = serde_json::from_str(json).expect("module tree parses");
    let mut compiler = Compiler::new(&ast).expect("semantic tables build");
    let module = compiler.compile(&ast).expect("compilation runs");
    (module, compiler)
}

fn compile_clean(json: &str) -> smelt_core::CompiledModule {
    let (module, compiler) = compile(json);
    let diagnostics: Vec<String> = compiler.diagnostics.iter().map(|d| d.to_string()).collect();
    assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
    module
}

fn assert_valid_wasm(module: &smelt_core::CompiledModule) {
    let text = render::render_module(module);
    let bytes = wat::parse_str(&text).unwrap_or_else(|e| panic!("invalid WAT: {e}\n{text}"));
    wasmparser::validate(&bytes).unwrap_or_else(|e| panic!("invalid module: {e}\n{text}"));
}

fn body_of<'m>(module: &'m smelt_core::CompiledModule, name: &str) -> &'m [Instruction] {
    &module
        .functions
        .iter()
        .find(|f| f.name == name)
        .unwrap_or_else(|| panic!("no function {name}"))
        .instructions
}

#[test]
fn constant_expression_folds_to_one_const() {
    let module = compile_clean(
        r#"{"declarations":[{"type":"FunctionDeclaration","name":"f","result":"i32","body":[
            {"type":"Return","value":{"type":"BinaryExpression","op":"+",
                "left":{"type":"Literal","source":"Int","value":3},
                "right":{"type":"BinaryExpression","op":"*",
                    "left":{"type":"Literal","source":"Int","value":4},
                    "right":{"type":"Literal","source":"Int","value":2}}}}]}]}"#,
    );
    assert_eq!(
        body_of(&module, "f"),
        &[Instruction::i32_const(11), Instruction::Return]
    );
    assert_valid_wasm(&module);
}

#[test]
fn additive_identity_disappears() {
    let module = compile_clean(
        r#"{"declarations":[{"type":"FunctionDeclaration","name":"f","result":"i32",
            "params":[{"name":"x","spec":{"type":"Named","name":"i32"}}],
            "body":[{"type":"Return","value":{"type":"BinaryExpression","op":"+",
                "left":{"type":"Identifier","name":"x"},
                "right":{"type":"Literal","source":"Int","value":0}}}]}]}"#,
    );
    assert_eq!(
        body_of(&module, "f"),
        &[Instruction::LocalGet("x".into()), Instruction::Return]
    );
}

#[test]
fn additive_chain_refolds_through_the_pipeline() {
    // (y - 5) + 8 → y + 3
    let module = compile_clean(
        r#"{"declarations":[{"type":"FunctionDeclaration","name":"f","result":"i32",
            "params":[{"name":"y","spec":{"type":"Named","name":"i32"}}],
            "body":[{"type":"Return","value":{"type":"BinaryExpression","op":"+",
                "left":{"type":"BinaryExpression","op":"-",
                    "left":{"type":"Identifier","name":"y"},
                    "right":{"type":"Literal","source":"Int","value":5}},
                "right":{"type":"Literal","source":"Int","value":8}}}]}]}"#,
    );
    assert_eq!(
        body_of(&module, "f"),
        &[
            Instruction::LocalGet("y".into()),
            Instruction::i32_const(3),
            Instruction::Binary {
                ty: ValueType::I32,
                op: BinOp::Add
            },
            Instruction::Return,
        ]
    );
}

#[test]
fn false_conditional_picks_the_alternate() {
    let module = compile_clean(
        r#"{"declarations":[{"type":"FunctionDeclaration","name":"f","result":"i32","body":[
            {"type":"Return","value":{"type":"ConditionalExpression",
                "condition":{"type":"Literal","source":"Int","value":0},
                "consequent":{"type":"Literal","source":"Int","value":1},
                "alternate":{"type":"Literal","source":"Int","value":2}}}]}]}"#,
    );
    assert_eq!(
        body_of(&module, "f"),
        &[Instruction::i32_const(2), Instruction::Return]
    );
}

#[test]
fn struct_field_offset_lands_in_the_load() {
    let module = compile_clean(
        r#"{"declarations":[
            {"type":"TypeAlias","name":"S","spec":{"type":"Struct","fields":[
                {"name":"a","spec":{"type":"Named","name":"i32"}},
                {"name":"b","spec":{"type":"Named","name":"i32"}},
                {"name":"c","spec":{"type":"Named","name":"f64"}}]}},
            {"type":"VariableDeclaration","name":"s","address":100,"spec":{"type":"Named","name":"S"}},
            {"type":"FunctionDeclaration","name":"get_c","result":"f64","body":[
                {"type":"Return","value":{"type":"MemberAccess",
                    "object":{"type":"Identifier","name":"s"},"member":"c"}}]}]}"#,
    );
    assert_eq!(
        body_of(&module, "get_c"),
        &[
            Instruction::i32_const(100),
            Instruction::Load {
                ty: ValueType::F64,
                width: MemWidth::W64,
                signed: false,
                offset: 8,
            },
            Instruction::Return,
        ]
    );
    assert_valid_wasm(&module);
}

#[test]
fn sizeof_folds_through_the_size_oracle() {
    let module = compile_clean(
        r#"{"declarations":[{"type":"FunctionDeclaration","name":"f","result":"i32","body":[
            {"type":"Return","value":{"type":"SizeOfExpression",
                "spec":{"type":"Array","item":{"type":"Named","name":"i16"},
                    "count":{"type":"Literal","source":"Int","value":4}}}}]}]}"#,
    );
    assert_eq!(
        body_of(&module, "f"),
        &[Instruction::i32_const(8), Instruction::Return]
    );
}

#[test]
fn item_access_scales_and_absorbs_constant_indexes() {
    let module = compile_clean(
        r#"{"declarations":[
            {"type":"VariableDeclaration","name":"a","address":200,
                "spec":{"type":"Array","item":{"type":"Named","name":"i16"},
                    "count":{"type":"Literal","source":"Int","value":4}}},
            {"type":"FunctionDeclaration","name":"third","result":"i16","body":[
                {"type":"Return","value":{"type":"ItemAccess",
                    "array":{"type":"Identifier","name":"a"},
                    "index":{"type":"Literal","source":"Int","value":3}}}]}]}"#,
    );
    assert_eq!(
        body_of(&module, "third"),
        &[
            Instruction::i32_const(200),
            Instruction::Load {
                ty: ValueType::I32,
                width: MemWidth::W16,
                signed: true,
                offset: 6,
            },
            Instruction::Return,
        ]
    );
}

#[test]
fn pointer_parameter_dereference() {
    let module = compile_clean(
        r#"{"declarations":[{"type":"FunctionDeclaration","name":"deref","result":"i32",
            "params":[{"name":"p","spec":{"type":"Pointer","target":{"type":"Named","name":"i32"}}}],
            "body":[{"type":"Return","value":{"type":"DereferenceExpression",
                "operand":{"type":"Identifier","name":"p"}}}]}]}"#,
    );
    assert_eq!(
        body_of(&module, "deref"),
        &[
            Instruction::LocalGet("p".into()),
            Instruction::Load {
                ty: ValueType::I32,
                width: MemWidth::W32,
                signed: true,
                offset: 0,
            },
            Instruction::Return,
        ]
    );
}

#[test]
fn address_of_dereference_round_trips() {
    // &(*p) is just p again once the peephole pass settles.
    let module = compile_clean(
        r#"{"declarations":[{"type":"FunctionDeclaration","name":"f","result":"i32",
            "params":[{"name":"p","spec":{"type":"Pointer","target":{"type":"Named","name":"i32"}}}],
            "body":[{"type":"Return","value":{"type":"UnaryExpression","op":"&",
                "operand":{"type":"DereferenceExpression",
                    "operand":{"type":"Identifier","name":"p"}}}}]}]}"#,
    );
    assert_eq!(
        body_of(&module, "f"),
        &[Instruction::LocalGet("p".into()), Instruction::Return]
    );
}

#[test]
fn while_loop_compiles_and_validates() {
    let module = compile_clean(
        r#"{"declarations":[{"type":"FunctionDeclaration","name":"sum","export":true,"result":"i32",
            "params":[{"name":"n","spec":{"type":"Named","name":"i32"}}],
            "body":[
                {"type":"LocalVariable","name":"total","spec":{"type":"Named","name":"i32"},
                    "init":{"type":"Literal","source":"Int","value":0}},
                {"type":"LocalVariable","name":"i","spec":{"type":"Named","name":"i32"},
                    "init":{"type":"Literal","source":"Int","value":0}},
                {"type":"While",
                    "condition":{"type":"BinaryExpression","op":"<",
                        "left":{"type":"Identifier","name":"i"},
                        "right":{"type":"Identifier","name":"n"}},
                    "body":[
                        {"type":"Assignment","target":{"type":"Identifier","name":"total"},
                            "value":{"type":"BinaryExpression","op":"+",
                                "left":{"type":"Identifier","name":"total"},
                                "right":{"type":"Identifier","name":"i"}}},
                        {"type":"Assignment","target":{"type":"Identifier","name":"i"},
                            "value":{"type":"BinaryExpression","op":"+",
                                "left":{"type":"Identifier","name":"i"},
                                "right":{"type":"Literal","source":"Int","value":1}}}]},
                {"type":"Return","value":{"type":"Identifier","name":"total"}}]}]}"#,
    );
    let body = body_of(&module, "sum");
    // The loop survives: it branches to itself.
    let block = body
        .iter()
        .find_map(|i| match i {
            Instruction::Block { body, .. } => Some(body),
            _ => None,
        })
        .expect("loop skeleton block");
    assert!(matches!(block[0], Instruction::Loop { .. }));
    assert_valid_wasm(&module);
}

#[test]
fn globals_and_consts_resolve() {
    let module = compile_clean(
        r#"{"declarations":[
            {"type":"ConstDeclaration","name":"LIMIT",
                "value":{"type":"Literal","source":"Int","value":10}},
            {"type":"GlobalDeclaration","name":"g","spec":"i32",
                "init":{"type":"Literal","source":"Int","value":5}},
            {"type":"FunctionDeclaration","name":"f","result":"i32","body":[
                {"type":"Return","value":{"type":"BinaryExpression","op":"+",
                    "left":{"type":"Identifier","name":"LIMIT"},
                    "right":{"type":"Identifier","name":"g"}}}]}]}"#,
    );
    // The literal moved right; the named constant folded in place.
    assert_eq!(
        body_of(&module, "f"),
        &[
            Instruction::GlobalGet("g".into()),
            Instruction::i32_const(10),
            Instruction::Binary {
                ty: ValueType::I32,
                op: BinOp::Add
            },
            Instruction::Return,
        ]
    );
    assert_eq!(module.globals.len(), 1);
    assert_valid_wasm(&module);
}

#[test]
fn global_assignment_round_trips() {
    let module = compile_clean(
        r#"{"declarations":[
            {"type":"GlobalDeclaration","name":"g","spec":"i32"},
            {"type":"FunctionDeclaration","name":"bump","body":[
                {"type":"Assignment","target":{"type":"Identifier","name":"g"},
                    "value":{"type":"BinaryExpression","op":"+",
                        "left":{"type":"Identifier","name":"g"},
                        "right":{"type":"Literal","source":"Int","value":1}}}]}]}"#,
    );
    assert_eq!(
        body_of(&module, "bump"),
        &[
            Instruction::GlobalGet("g".into()),
            Instruction::i32_const(1),
            Instruction::Binary {
                ty: ValueType::I32,
                op: BinOp::Add
            },
            Instruction::GlobalSet("g".into()),
        ]
    );
    assert_valid_wasm(&module);
}

#[test]
fn memory_store_absorbs_field_offset() {
    let module = compile_clean(
        r#"{"declarations":[
            {"type":"TypeAlias","name":"P","spec":{"type":"Struct","fields":[
                {"name":"x","spec":{"type":"Named","name":"i32"}},
                {"name":"y","spec":{"type":"Named","name":"i32"}}]}},
            {"type":"VariableDeclaration","name":"p","address":64,"spec":{"type":"Named","name":"P"}},
            {"type":"FunctionDeclaration","name":"set_y",
                "params":[{"name":"v","spec":{"type":"Named","name":"i32"}}],
                "body":[{"type":"Assignment",
                    "target":{"type":"MemberAccess","object":{"type":"Identifier","name":"p"},"member":"y"},
                    "value":{"type":"Identifier","name":"v"}}]}]}"#,
    );
    assert_eq!(
        body_of(&module, "set_y"),
        &[
            Instruction::i32_const(64),
            Instruction::LocalGet("v".into()),
            Instruction::Store {
                ty: ValueType::I32,
                width: MemWidth::W32,
                offset: 4,
            },
        ]
    );
    assert_eq!(module.memory_pages, Some(1));
    assert_valid_wasm(&module);
}

#[test]
fn narrow_local_initializer_tightens_when_needed() {
    // A u8 local initialized from a parameter needs the mask; a literal in
    // range does not.
    let module = compile_clean(
        r#"{"declarations":[{"type":"FunctionDeclaration","name":"f","result":"i32",
            "params":[{"name":"x","spec":{"type":"Named","name":"i32"}}],
            "body":[
                {"type":"LocalVariable","name":"small","spec":{"type":"Named","name":"u8"},
                    "init":{"type":"Identifier","name":"x"}},
                {"type":"Return","value":{"type":"Identifier","name":"small"}}]}]}"#,
    );
    let body = body_of(&module, "f");
    assert!(body.contains(&Instruction::i32_const(0xff)));
    assert!(body.contains(&Instruction::Binary {
        ty: ValueType::I32,
        op: BinOp::And
    }));
    assert_valid_wasm(&module);
}

#[test]
fn function_calls_cast_arguments() {
    let module = compile_clean(
        r#"{"declarations":[
            {"type":"FunctionDeclaration","name":"wide","result":"i64",
                "params":[{"name":"v","spec":{"type":"Named","name":"i64"}}],
                "body":[{"type":"Return","value":{"type":"Identifier","name":"v"}}]},
            {"type":"FunctionDeclaration","name":"caller","result":"i64","body":[
                {"type":"Return","value":{"type":"FunctionInvocation","callee":"wide",
                    "args":[{"type":"Literal","source":"Int","value":7}]}}]}]}"#,
    );
    let body = body_of(&module, "caller");
    assert!(body.contains(&Instruction::Call("wide".into())));
    // The i32 literal widens to the declared i64 parameter.
    assert!(body.contains(&Instruction::i64_const(7)) || body.len() > 2);
    assert_valid_wasm(&module);
}

#[test]
fn integer_abs_expands_through_the_temporary() {
    let module = compile_clean(
        r#"{"declarations":[{"type":"FunctionDeclaration","name":"f","result":"i32",
            "params":[{"name":"x","spec":{"type":"Named","name":"i32"}}],
            "body":[{"type":"Return","value":{"type":"BuiltInFunctionInvocation",
                "name":"abs","args":[{"type":"Identifier","name":"x"}]}}]}]}"#,
    );
    let body = body_of(&module, "f");
    assert!(body.contains(&Instruction::LocalTee(".t.i32".into())));
    assert!(body.iter().any(|i| matches!(i, Instruction::If { .. })));
    assert_valid_wasm(&module);
}

#[test]
fn min_promotes_integers_to_f32() {
    let module = compile_clean(
        r#"{"declarations":[{"type":"FunctionDeclaration","name":"f","result":"f32",
            "params":[{"name":"x","spec":{"type":"Named","name":"i32"}},
                      {"name":"y","spec":{"type":"Named","name":"i32"}}],
            "body":[{"type":"Return","value":{"type":"BuiltInFunctionInvocation",
                "name":"min","args":[{"type":"Identifier","name":"x"},{"type":"Identifier","name":"y"}]}}]}]}"#,
    );
    let body = body_of(&module, "f");
    assert!(body.contains(&Instruction::Binary {
        ty: ValueType::F32,
        op: BinOp::Min
    }));
    assert_valid_wasm(&module);
}

#[test]
fn unknown_identifier_reports_w142() {
    let (_, compiler) = compile(
        r#"{"declarations":[{"type":"FunctionDeclaration","name":"f","result":"i32","body":[
            {"type":"Return","value":{"type":"Identifier","name":"ghost"}}]}]}"#,
    );
    let codes: Vec<ErrorCode> = compiler.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorCode::UnresolvedIdentifier]);
}

#[test]
fn duplicate_local_reports_w140() {
    let (_, compiler) = compile(
        r#"{"declarations":[{"type":"FunctionDeclaration","name":"f","body":[
            {"type":"LocalVariable","name":"a","spec":{"type":"Named","name":"i32"}},
            {"type":"LocalVariable","name":"a","spec":{"type":"Named","name":"i64"}}]}]}"#,
    );
    let codes: Vec<ErrorCode> = compiler.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorCode::DuplicateLocal]);
}

#[test]
fn integer_operator_on_float_reports_w145() {
    let (_, compiler) = compile(
        r#"{"declarations":[{"type":"FunctionDeclaration","name":"f","result":"i32",
            "params":[{"name":"x","spec":{"type":"Named","name":"f64"}}],
            "body":[{"type":"Return","value":{"type":"BinaryExpression","op":"%",
                "left":{"type":"Identifier","name":"x"},
                "right":{"type":"Identifier","name":"x"}}}]}]}"#,
    );
    let codes: Vec<ErrorCode> = compiler.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorCode::OperatorTypeMismatch]);
}

#[test]
fn member_access_on_non_struct_reports_w147() {
    let (_, compiler) = compile(
        r#"{"declarations":[
            {"type":"VariableDeclaration","name":"v","address":0,"spec":{"type":"Named","name":"i32"}},
            {"type":"FunctionDeclaration","name":"f","result":"i32","body":[
                {"type":"Return","value":{"type":"MemberAccess",
                    "object":{"type":"Identifier","name":"v"},"member":"x"}}]}]}"#,
    );
    let codes: Vec<ErrorCode> = compiler.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorCode::InvalidMemberAccess]);
}

#[test]
fn error_recovery_continues_with_sibling_functions() {
    let (module, compiler) = compile(
        r#"{"declarations":[
            {"type":"FunctionDeclaration","name":"bad","result":"i32","body":[
                {"type":"Return","value":{"type":"Identifier","name":"ghost"}}]},
            {"type":"FunctionDeclaration","name":"good","result":"i32","body":[
                {"type":"Return","value":{"type":"Literal","source":"Int","value":1}}]}]}"#,
    );
    assert_eq!(compiler.diagnostics.len(), 1);
    assert_eq!(
        body_of(&module, "good"),
        &[Instruction::i32_const(1), Instruction::Return]
    );
}

#[test]
fn bigint_literal_lowers_to_i64() {
    let module = compile_clean(
        r#"{"declarations":[{"type":"FunctionDeclaration","name":"f","result":"u64","body":[
            {"type":"Return","value":{"type":"Literal","source":"BigInt","value":"18446744073709551615"}}]}]}"#,
    );
    assert_eq!(
        body_of(&module, "f"),
        &[Instruction::i64_const(-1), Instruction::Return]
    );
}

#[test]
fn stack_discipline_holds_for_compiled_functions() {
    let json = r#"{"declarations":[
        {"type":"GlobalDeclaration","name":"g","spec":"f64"},
        {"type":"FunctionDeclaration","name":"f","result":"f64",
            "params":[{"name":"x","spec":{"type":"Named","name":"f64"}},
                      {"name":"n","spec":{"type":"Named","name":"i32"}}],
            "body":[
                {"type":"If","condition":{"type":"BinaryExpression","op":">",
                        "left":{"type":"Identifier","name":"n"},
                        "right":{"type":"Literal","source":"Int","value":0}},
                    "then_branch":[{"type":"Return","value":{"type":"BuiltInFunctionInvocation",
                        "name":"sqrt","args":[{"type":"Identifier","name":"x"}]}}],
                    "else_branch":[]},
                {"type":"Return","value":{"type":"Identifier","name":"g"}}]}]}"#;
    let ast: ModuleAst = serde_json::from_str(json).unwrap();
    let mut compiler = Compiler::new(&ast).unwrap();
    let module = compiler.compile(&ast).unwrap();
    assert!(compiler.diagnostics.is_empty());
    for function in &module.functions {
        smelt_core::check::check_function(function, compiler.decls()).unwrap();
    }
    assert_valid_wasm(&module);
}
