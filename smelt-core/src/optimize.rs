//! Peephole optimization over the emitted instruction list.
//!
//! Every rule scans one body (recursing into `block`/`loop`/`if` bodies) and
//! returns the number of rewrites it performed. The driver reruns all rules
//! until a full round changes nothing, then sweeps locals that no longer have
//! any reference. Offset absorption runs ahead of constant folding so that
//! `const base; const off; add; load` keeps its base constant and gains an
//! `offset=` instead of collapsing into a single absolute address.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};

use crate::builder::FunctionBuilder;
use crate::instr::{BinOp, ConvOp, Instruction, MemWidth, UnOp, Value};
use crate::types::ValueType;

/// Rounds after which a non-converging rule set is treated as malformed.
const MAX_ROUNDS: usize = 1000;

/// Run the peephole rules to a fixed point and sweep unused locals.
pub fn optimize_function(builder: &mut FunctionBuilder) -> Result<()> {
    let params: HashSet<String> = builder
        .params()
        .map(|p| p.machine_name.clone())
        .collect();
    let mut rounds = 0;
    loop {
        let body = &mut builder.instructions;
        let mut changed = 0;
        changed += strip_dead_code(body);
        changed += fuse_branch_if(body);
        changed += fold_constant_branches(body);
        changed += drop_repeated_branches(body);
        changed += absorb_memory_offsets(body);
        changed += fold_constant_ops(body);
        changed += strip_identities(body);
        changed += fold_double_eqz(body);
        changed += absorb_narrow_store_masks(body);
        changed += form_local_tees(body);
        changed += duplicate_tee_constants(body);
        changed += remove_single_use_tees(body);
        changed += simplify_trivial_frames(body);
        changed += peel_loops(body);
        changed += peel_blocks(body);
        changed += forward_single_set_locals(body, &params);
        if changed == 0 {
            break;
        }
        rounds += 1;
        if rounds > MAX_ROUNDS {
            bail!(
                "peephole optimizer failed to converge on function {}",
                builder.name
            );
        }
    }
    sweep_unused_locals(builder);
    Ok(())
}

/// Apply `f` to every directly nested body.
fn recurse(
    instructions: &mut [Instruction],
    f: &mut impl FnMut(&mut Vec<Instruction>) -> usize,
) -> usize {
    let mut count = 0;
    for instruction in instructions {
        match instruction {
            Instruction::Block { body, .. } | Instruction::Loop { body, .. } => {
                count += f(body);
            }
            Instruction::If {
                then_body,
                else_body,
                ..
            } => {
                count += f(then_body);
                count += f(else_body);
            }
            _ => {}
        }
    }
    count
}

// ---------------------------------------------------------------------------
// Rule 1: dead code after terminators
// ---------------------------------------------------------------------------

fn strip_dead_code(body: &mut Vec<Instruction>) -> usize {
    let mut count = recurse(body, &mut strip_dead_code);
    if let Some(pos) = body.iter().position(Instruction::is_terminator) {
        if pos + 1 < body.len() {
            count += body.len() - pos - 1;
            body.truncate(pos + 1);
        }
    }
    count
}

// ---------------------------------------------------------------------------
// Rule 2: `if { br L }` with an empty else becomes `br_if L`
// ---------------------------------------------------------------------------

fn fuse_branch_if(body: &mut Vec<Instruction>) -> usize {
    let mut count = recurse(body, &mut fuse_branch_if);
    for instruction in body.iter_mut() {
        let fused = match instruction {
            Instruction::If {
                result: None,
                then_body,
                else_body,
            } if else_body.is_empty() && then_body.len() == 1 => match &then_body[0] {
                Instruction::Br(label) => Some(label.clone()),
                _ => None,
            },
            _ => None,
        };
        if let Some(label) = fused {
            *instruction = Instruction::BrIf(label);
            count += 1;
        }
    }
    count
}

// ---------------------------------------------------------------------------
// Rule 3: constant br_if
// ---------------------------------------------------------------------------

fn fold_constant_branches(body: &mut Vec<Instruction>) -> usize {
    let mut count = recurse(body, &mut fold_constant_branches);
    let old = std::mem::take(body);
    let mut i = 0;
    while i < old.len() {
        if let (Instruction::Const(Value::I32(c)), Some(Instruction::BrIf(label))) =
            (&old[i], old.get(i + 1))
        {
            if *c != 0 {
                body.push(Instruction::Br(label.clone()));
            }
            count += 1;
            i += 2;
            continue;
        }
        body.push(old[i].clone());
        i += 1;
    }
    count
}

// ---------------------------------------------------------------------------
// Rule 4: repeated unconditional branch to the same label
// ---------------------------------------------------------------------------

fn drop_repeated_branches(body: &mut Vec<Instruction>) -> usize {
    let mut count = recurse(body, &mut drop_repeated_branches);
    let old = std::mem::take(body);
    let mut i = 0;
    while i < old.len() {
        if let (Instruction::Br(first), Some(Instruction::Br(second))) = (&old[i], old.get(i + 1))
        {
            if first == second {
                body.push(old[i].clone());
                count += 1;
                i += 2;
                continue;
            }
        }
        body.push(old[i].clone());
        i += 1;
    }
    count
}

// ---------------------------------------------------------------------------
// Rule 11: absorb address offsets into loads and stores
// ---------------------------------------------------------------------------

fn absorb_memory_offsets(body: &mut Vec<Instruction>) -> usize {
    let mut count = recurse(body, &mut absorb_memory_offsets);
    let old = std::mem::take(body);
    let mut i = 0;
    while i < old.len() {
        if let Some(k) = absorbable_offset(&old[i], old.get(i + 1)) {
            // const k; add; load  →  load offset+k
            if let Some(Instruction::Load {
                ty,
                width,
                signed,
                offset,
            }) = old.get(i + 2)
            {
                if let Some(offset) = offset.checked_add(k) {
                    body.push(Instruction::Load {
                        ty: *ty,
                        width: *width,
                        signed: *signed,
                        offset,
                    });
                    count += 1;
                    i += 3;
                    continue;
                }
            }
            // const k; add; value; store  →  value; store offset+k
            if let (Some(source), Some(Instruction::Store { ty, width, offset })) =
                (old.get(i + 2), old.get(i + 3))
            {
                let simple_source = matches!(
                    source,
                    Instruction::LocalGet(_) | Instruction::GlobalGet(_) | Instruction::Const(_)
                );
                if simple_source {
                    if let Some(offset) = offset.checked_add(k) {
                        body.push(source.clone());
                        body.push(Instruction::Store {
                            ty: *ty,
                            width: *width,
                            offset,
                        });
                        count += 1;
                        i += 4;
                        continue;
                    }
                }
            }
        }
        body.push(old[i].clone());
        i += 1;
    }
    count
}

/// `const k; i32.add` with a non-negative `k`.
fn absorbable_offset(first: &Instruction, second: Option<&Instruction>) -> Option<u32> {
    match (first, second) {
        (
            Instruction::Const(Value::I32(k)),
            Some(Instruction::Binary {
                ty: ValueType::I32,
                op: BinOp::Add,
            }),
        ) if *k >= 0 => Some(*k as u32),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Rule 5: constant folding at the instruction level
// ---------------------------------------------------------------------------

fn fold_constant_ops(body: &mut Vec<Instruction>) -> usize {
    let mut count = recurse(body, &mut fold_constant_ops);
    let old = std::mem::take(body);
    let mut i = 0;
    while i < old.len() {
        // const a; <additive>; const b; <same additive>  →  const a+b; <additive>
        if i + 3 < old.len() {
            if let (
                Instruction::Const(a),
                Instruction::Binary { ty: t1, op: op1 },
                Instruction::Const(b),
                Instruction::Binary { ty: t2, op: op2 },
            ) = (&old[i], &old[i + 1], &old[i + 2], &old[i + 3])
            {
                if t1 == t2
                    && op1 == op2
                    && matches!(*op1, BinOp::Add | BinOp::Sub)
                {
                    if let Some(fused) = fold_binary_const(*t1, BinOp::Add, *a, *b) {
                        body.push(Instruction::Const(fused));
                        body.push(Instruction::Binary { ty: *t1, op: *op1 });
                        count += 1;
                        i += 4;
                        continue;
                    }
                }
            }
        }
        // const a; const b; <binary>  →  const r
        if i + 2 < old.len() {
            if let (
                Instruction::Const(a),
                Instruction::Const(b),
                Instruction::Binary { ty, op },
            ) = (&old[i], &old[i + 1], &old[i + 2])
            {
                if let Some(folded) = fold_binary_const(*ty, *op, *a, *b) {
                    body.push(Instruction::Const(folded));
                    count += 1;
                    i += 3;
                    continue;
                }
            }
        }
        // const a; <conversion>  →  const r
        if i + 1 < old.len() {
            if let (Instruction::Const(a), Instruction::Convert(op)) = (&old[i], &old[i + 1]) {
                if let Some(folded) = fold_convert_const(*op, *a) {
                    body.push(Instruction::Const(folded));
                    count += 1;
                    i += 2;
                    continue;
                }
            }
        }
        body.push(old[i].clone());
        i += 1;
    }
    count
}

/// Integer constant arithmetic for the recognized fold set. Two's-complement
/// wrapping matches the machine exactly; no wider arithmetic is needed.
fn fold_binary_const(ty: ValueType, op: BinOp, a: Value, b: Value) -> Option<Value> {
    match (ty, a, b) {
        (ValueType::I32, Value::I32(x), Value::I32(y)) => {
            let r = match op {
                BinOp::Add => x.wrapping_add(y),
                BinOp::Sub => x.wrapping_sub(y),
                BinOp::Mul => x.wrapping_mul(y),
                BinOp::And => x & y,
                BinOp::Or => x | y,
                BinOp::Xor => x ^ y,
                BinOp::Shl => x.wrapping_shl(y as u32),
                BinOp::ShrS => x.wrapping_shr(y as u32),
                BinOp::ShrU => ((x as u32).wrapping_shr(y as u32)) as i32,
                _ => return None,
            };
            Some(Value::I32(r))
        }
        (ValueType::I64, Value::I64(x), Value::I64(y)) => {
            let r = match op {
                BinOp::Add => x.wrapping_add(y),
                BinOp::Sub => x.wrapping_sub(y),
                BinOp::Mul => x.wrapping_mul(y),
                BinOp::And => x & y,
                BinOp::Or => x | y,
                BinOp::Xor => x ^ y,
                BinOp::Shl => x.wrapping_shl(y as u32),
                BinOp::ShrS => x.wrapping_shr(y as u32),
                BinOp::ShrU => ((x as u64).wrapping_shr(y as u32)) as i64,
                _ => return None,
            };
            Some(Value::I64(r))
        }
        _ => None,
    }
}

fn fold_convert_const(op: ConvOp, a: Value) -> Option<Value> {
    match (op, a) {
        (ConvOp::I64ExtendI32S, Value::I32(v)) => Some(Value::I64(v as i64)),
        (ConvOp::I64ExtendI32U, Value::I32(v)) => Some(Value::I64(v as u32 as i64)),
        (ConvOp::F32DemoteF64, Value::F64(v)) => Some(Value::F32(v as f32)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Rule 6: additive and multiplicative identities
// ---------------------------------------------------------------------------

fn strip_identities(body: &mut Vec<Instruction>) -> usize {
    let mut count = recurse(body, &mut strip_identities);
    let old = std::mem::take(body);
    let mut i = 0;
    while i < old.len() {
        if let (Instruction::Const(c), Some(Instruction::Binary { ty, op })) =
            (&old[i], old.get(i + 1))
        {
            if c.value_type() == *ty {
                let removable = match op {
                    BinOp::Add | BinOp::Sub => c.as_integer() == Some(0),
                    BinOp::Mul | BinOp::DivS | BinOp::DivU => c.as_integer() == Some(1),
                    _ => false,
                };
                if removable {
                    count += 1;
                    i += 2;
                    continue;
                }
            }
        }
        body.push(old[i].clone());
        i += 1;
    }
    count
}

// ---------------------------------------------------------------------------
// Rule 7: double eqz of a constant
// ---------------------------------------------------------------------------

fn fold_double_eqz(body: &mut Vec<Instruction>) -> usize {
    let mut count = recurse(body, &mut fold_double_eqz);
    let old = std::mem::take(body);
    let mut i = 0;
    while i < old.len() {
        if i + 2 < old.len() {
            if let (
                Instruction::Const(c),
                Instruction::Unary { op: UnOp::Eqz, .. },
                Instruction::Unary {
                    op: UnOp::Eqz,
                    ty: ValueType::I32,
                },
            ) = (&old[i], &old[i + 1], &old[i + 2])
            {
                if let Some(v) = c.as_integer() {
                    body.push(Instruction::i32_const((v != 0) as i32));
                    count += 1;
                    i += 3;
                    continue;
                }
            }
        }
        body.push(old[i].clone());
        i += 1;
    }
    count
}

// ---------------------------------------------------------------------------
// Rule 8: narrow stores already truncate; drop the mask
// ---------------------------------------------------------------------------

fn absorb_narrow_store_masks(body: &mut Vec<Instruction>) -> usize {
    let mut count = recurse(body, &mut absorb_narrow_store_masks);
    let old = std::mem::take(body);
    let mut i = 0;
    while i < old.len() {
        if i + 2 < old.len() {
            if let (
                Instruction::Const(Value::I32(mask)),
                Instruction::Binary {
                    ty: ValueType::I32,
                    op: BinOp::And,
                },
                Instruction::Store { width, .. },
            ) = (&old[i], &old[i + 1], &old[i + 2])
            {
                let redundant =
                    matches!((*mask, *width), (0xff, MemWidth::W8) | (0xffff, MemWidth::W16));
                if redundant {
                    body.push(old[i + 2].clone());
                    count += 1;
                    i += 3;
                    continue;
                }
            }
        }
        body.push(old[i].clone());
        i += 1;
    }
    count
}

// ---------------------------------------------------------------------------
// Rule 9: local.set followed by local.get of the same local
// ---------------------------------------------------------------------------

fn form_local_tees(body: &mut Vec<Instruction>) -> usize {
    let mut count = recurse(body, &mut form_local_tees);
    let old = std::mem::take(body);
    let mut i = 0;
    while i < old.len() {
        if let (Instruction::LocalSet(set), Some(Instruction::LocalGet(get))) =
            (&old[i], old.get(i + 1))
        {
            if set == get {
                body.push(Instruction::LocalTee(set.clone()));
                count += 1;
                i += 2;
                continue;
            }
        }
        body.push(old[i].clone());
        i += 1;
    }
    count
}

// ---------------------------------------------------------------------------
// Rule 12: duplicate a constant around a tee instead of re-reading it
// ---------------------------------------------------------------------------

fn duplicate_tee_constants(body: &mut Vec<Instruction>) -> usize {
    let mut count = recurse(body, &mut duplicate_tee_constants);
    let mut i = 0;
    while i + 2 < body.len() {
        let duplicated = match (&body[i], &body[i + 1], &body[i + 2]) {
            (
                Instruction::Const(c),
                Instruction::LocalTee(tee),
                Instruction::LocalGet(get),
            ) if tee == get => Some(*c),
            _ => None,
        };
        if let Some(constant) = duplicated {
            body[i + 2] = Instruction::Const(constant);
            count += 1;
        }
        i += 1;
    }
    count
}

// ---------------------------------------------------------------------------
// Rule 10: a tee whose local has no other reference
// ---------------------------------------------------------------------------

fn remove_single_use_tees(body: &mut Vec<Instruction>) -> usize {
    let counts = local_reference_counts(body);
    remove_tees_with_counts(body, &counts)
}

fn remove_tees_with_counts(
    body: &mut Vec<Instruction>,
    counts: &HashMap<String, usize>,
) -> usize {
    let mut count = recurse(body, &mut |b| remove_tees_with_counts(b, counts));
    let before = body.len();
    body.retain(|instruction| match instruction {
        Instruction::LocalTee(name) => counts.get(name) != Some(&1),
        _ => true,
    });
    count += before - body.len();
    count
}

// ---------------------------------------------------------------------------
// Rule 13: empty and branch-only frames
// ---------------------------------------------------------------------------

fn simplify_trivial_frames(body: &mut Vec<Instruction>) -> usize {
    let mut count = recurse(body, &mut simplify_trivial_frames);
    let old = std::mem::take(body);
    for instruction in old {
        match &instruction {
            Instruction::Loop { label, body: inner } => {
                if inner.is_empty() {
                    count += 1;
                    continue;
                }
                if inner.len() == 1 {
                    match &inner[0] {
                        Instruction::Br(target) if target != label => {
                            body.push(Instruction::Br(target.clone()));
                            count += 1;
                            continue;
                        }
                        Instruction::BrIf(target) if target != label => {
                            body.push(Instruction::BrIf(target.clone()));
                            count += 1;
                            continue;
                        }
                        _ => {}
                    }
                }
            }
            Instruction::Block { label, body: inner } => {
                if inner.is_empty() {
                    count += 1;
                    continue;
                }
                if inner.len() == 1 && inner[0] == Instruction::Br(label.clone()) {
                    count += 1;
                    continue;
                }
            }
            _ => {}
        }
        body.push(instruction);
    }
    count
}

// ---------------------------------------------------------------------------
// Rule 14: peel loops that never branch to themselves
// ---------------------------------------------------------------------------

fn peel_loops(body: &mut Vec<Instruction>) -> usize {
    let mut count = recurse(body, &mut peel_loops);
    let old = std::mem::take(body);
    for instruction in old {
        if let Instruction::Loop { label, body: inner } = &instruction {
            if !branches_to(inner, label) {
                body.extend(inner.iter().cloned());
                count += 1;
                continue;
            }
        }
        body.push(instruction);
    }
    count
}

fn branches_to(body: &[Instruction], label: &str) -> bool {
    body.iter().any(|instruction| match instruction {
        Instruction::Br(target) | Instruction::BrIf(target) => target == label,
        Instruction::Block { body, .. } | Instruction::Loop { body, .. } => {
            branches_to(body, label)
        }
        Instruction::If {
            then_body,
            else_body,
            ..
        } => branches_to(then_body, label) || branches_to(else_body, label),
        _ => false,
    })
}

// ---------------------------------------------------------------------------
// Rule 15: peel blocks only branched to from their own top level
// ---------------------------------------------------------------------------

fn peel_blocks(body: &mut Vec<Instruction>) -> usize {
    let mut count = recurse(body, &mut peel_blocks);
    let old = std::mem::take(body);
    for instruction in old {
        if let Instruction::Block { label, body: inner } = &instruction {
            if !contains_br_if(inner) && !nested_branches_to(inner, label) {
                for nested in inner {
                    if *nested == Instruction::Br(label.clone()) {
                        continue;
                    }
                    body.push(nested.clone());
                }
                count += 1;
                continue;
            }
        }
        body.push(instruction);
    }
    count
}

fn contains_br_if(body: &[Instruction]) -> bool {
    body.iter().any(|instruction| match instruction {
        Instruction::BrIf(_) => true,
        Instruction::Block { body, .. } | Instruction::Loop { body, .. } => contains_br_if(body),
        Instruction::If {
            then_body,
            else_body,
            ..
        } => contains_br_if(then_body) || contains_br_if(else_body),
        _ => false,
    })
}

/// A branch to `label` from inside any nested construct (not the top level).
fn nested_branches_to(body: &[Instruction], label: &str) -> bool {
    body.iter().any(|instruction| match instruction {
        Instruction::Block { body, .. } | Instruction::Loop { body, .. } => {
            branches_to(body, label)
        }
        Instruction::If {
            then_body,
            else_body,
            ..
        } => branches_to(then_body, label) || branches_to(else_body, label),
        _ => false,
    })
}

// ---------------------------------------------------------------------------
// Inline-parameter shortcut: forward a stable source through a
// set-once/read-once local
// ---------------------------------------------------------------------------

fn forward_single_set_locals(body: &mut Vec<Instruction>, params: &HashSet<String>) -> usize {
    let usage = local_usage(body);
    let written_globals = global_writes(body);
    let Some((local, source)) = extract_forward_candidate(body, &usage, &written_globals, params)
    else {
        return 0;
    };
    substitute_single_get(body, &local, &source);
    1
}

#[derive(Default, Clone, Copy)]
struct Usage {
    gets: usize,
    sets: usize,
}

fn local_usage(body: &[Instruction]) -> HashMap<String, Usage> {
    let mut usage: HashMap<String, Usage> = HashMap::new();
    collect_usage(body, &mut usage);
    usage
}

fn collect_usage(body: &[Instruction], usage: &mut HashMap<String, Usage>) {
    for instruction in body {
        match instruction {
            Instruction::LocalGet(name) => usage.entry(name.clone()).or_default().gets += 1,
            Instruction::LocalSet(name) => usage.entry(name.clone()).or_default().sets += 1,
            Instruction::LocalTee(name) => {
                let entry = usage.entry(name.clone()).or_default();
                entry.gets += 1;
                entry.sets += 1;
            }
            Instruction::Block { body, .. } | Instruction::Loop { body, .. } => {
                collect_usage(body, usage);
            }
            Instruction::If {
                then_body,
                else_body,
                ..
            } => {
                collect_usage(then_body, usage);
                collect_usage(else_body, usage);
            }
            _ => {}
        }
    }
}

fn global_writes(body: &[Instruction]) -> HashSet<String> {
    let mut written = HashSet::new();
    fn walk(body: &[Instruction], written: &mut HashSet<String>) {
        for instruction in body {
            match instruction {
                Instruction::GlobalSet(name) => {
                    written.insert(name.clone());
                }
                Instruction::Block { body, .. } | Instruction::Loop { body, .. } => {
                    walk(body, written);
                }
                Instruction::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    walk(then_body, written);
                    walk(else_body, written);
                }
                _ => {}
            }
        }
    }
    walk(body, &mut written);
    written
}

/// Find and remove one `source; local.set p` pair eligible for forwarding.
fn extract_forward_candidate(
    body: &mut Vec<Instruction>,
    usage: &HashMap<String, Usage>,
    written_globals: &HashSet<String>,
    params: &HashSet<String>,
) -> Option<(String, Instruction)> {
    let mut i = 0;
    while i + 1 < body.len() {
        if let Instruction::LocalSet(local) = &body[i + 1] {
            let eligible = !params.contains(local)
                && usage
                    .get(local)
                    .is_some_and(|u| u.sets == 1 && u.gets == 1)
                && match &body[i] {
                    Instruction::Const(_) => true,
                    Instruction::LocalGet(source) => {
                        usage.get(source).map_or(true, |u| u.sets == 0)
                    }
                    Instruction::GlobalGet(source) => !written_globals.contains(source),
                    _ => false,
                };
            if eligible {
                let local = match body.remove(i + 1) {
                    Instruction::LocalSet(name) => name,
                    _ => unreachable!(),
                };
                let source = body.remove(i);
                return Some((local, source));
            }
        }
        i += 1;
    }
    for instruction in body.iter_mut() {
        let found = match instruction {
            Instruction::Block { body, .. } | Instruction::Loop { body, .. } => {
                extract_forward_candidate(body, usage, written_globals, params)
            }
            Instruction::If {
                then_body,
                else_body,
                ..
            } => extract_forward_candidate(then_body, usage, written_globals, params).or_else(
                || extract_forward_candidate(else_body, usage, written_globals, params),
            ),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

fn substitute_single_get(body: &mut [Instruction], local: &str, source: &Instruction) -> bool {
    for instruction in body.iter_mut() {
        match instruction {
            Instruction::LocalGet(name) if name == local => {
                *instruction = source.clone();
                return true;
            }
            Instruction::Block { body, .. } | Instruction::Loop { body, .. } => {
                if substitute_single_get(body, local, source) {
                    return true;
                }
            }
            Instruction::If {
                then_body,
                else_body,
                ..
            } => {
                if substitute_single_get(then_body, local, source)
                    || substitute_single_get(else_body, local, source)
                {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Local-usage sweep
// ---------------------------------------------------------------------------

/// Number of instructions referencing each local; a tee counts once.
fn local_reference_counts(body: &[Instruction]) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    fn walk(body: &[Instruction], counts: &mut HashMap<String, usize>) {
        for instruction in body {
            match instruction {
                Instruction::LocalGet(name)
                | Instruction::LocalSet(name)
                | Instruction::LocalTee(name) => {
                    *counts.entry(name.clone()).or_default() += 1;
                }
                Instruction::Block { body, .. } | Instruction::Loop { body, .. } => {
                    walk(body, counts);
                }
                Instruction::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    walk(then_body, counts);
                    walk(else_body, counts);
                }
                _ => {}
            }
        }
    }
    walk(body, &mut counts);
    counts
}

fn sweep_unused_locals(builder: &mut FunctionBuilder) {
    let counts = local_reference_counts(&builder.instructions);
    builder.retain_locals(|name| counts.get(name).copied().unwrap_or(0) > 0);
}
