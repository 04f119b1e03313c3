//! Expansions of illegal instructions into legal sequences
//!
//! Each expansion rewrites the instruction in place and inserts helpers
//! around it. The values defined by the original instruction keep their
//! numbers so uses elsewhere in the function stay valid.

use crate::ir::condcodes::IntCC;
use crate::ir::entities::{Inst, Value};
use crate::ir::function::Function;
use crate::ir::immediates::Imm64;
use crate::ir::instructions::{InstructionData, Opcode};
use crate::ir::InsertBuilder;
use ebbc_common::{CodegenError, CodegenResult};

/// Expand `inst`. Returns `false` when no expansion applies.
pub(super) fn expand(func: &mut Function, inst: Inst) -> CodegenResult<bool> {
    match func.dfg[inst].clone() {
        InstructionData::Binary {
            opcode: Opcode::IaddCout,
            args: [x, y],
        } => add_carry_out(func, inst, x, y),
        InstructionData::Binary {
            opcode: Opcode::IsubBout,
            args: [x, y],
        } => sub_borrow_out(func, inst, x, y),
        InstructionData::Ternary {
            opcode: Opcode::IaddCin,
            args: [x, y, c],
        } => with_carry_in(func, inst, Opcode::Iadd, x, y, c),
        InstructionData::Ternary {
            opcode: Opcode::IsubBin,
            args: [x, y, b],
        } => with_carry_in(func, inst, Opcode::Isub, x, y, b),
        InstructionData::Ternary {
            opcode: Opcode::IaddCarry,
            args: [x, y, c],
        } => add_carry(func, inst, x, y, c),
        InstructionData::Ternary {
            opcode: Opcode::IsubBorrow,
            args: [x, y, b],
        } => sub_borrow(func, inst, x, y, b),
        InstructionData::Ternary {
            opcode: Opcode::Select,
            args: [c, a, b],
        } => select(func, inst, c, a, b)?,
        InstructionData::Binary { opcode, args: [x, y] } => match opcode {
            Opcode::BandNot => inverted_operand(func, inst, Opcode::Band, x, y),
            Opcode::BorNot => inverted_operand(func, inst, Opcode::Bor, x, y),
            Opcode::BxorNot => inverted_operand(func, inst, Opcode::Bxor, x, y),
            Opcode::Rotl => rotate(func, inst, Opcode::Ishl, Opcode::Ushr, x, y),
            Opcode::Rotr => rotate(func, inst, Opcode::Ushr, Opcode::Ishl, x, y),
            _ => return Ok(false),
        },
        InstructionData::Unary {
            opcode: Opcode::Popcnt,
            arg,
        } => popcount(func, inst, arg),
        InstructionData::BinaryImm { opcode, arg, imm } => {
            let reg_opcode = match opcode.without_imm() {
                Some(op) => op,
                None => return Ok(false),
            };
            let ty = func.dfg.value_type(arg);
            let k = InsertBuilder::before(func, inst).iconst(ty, imm.value());
            let args = if opcode == Opcode::IrsubImm { [k, arg] } else { [arg, k] };
            func.dfg[inst] = InstructionData::Binary {
                opcode: reg_opcode,
                args,
            };
        }
        InstructionData::IntCompareImm { cond, arg, imm, .. } => {
            let ty = func.dfg.value_type(arg);
            let k = InsertBuilder::before(func, inst).iconst(ty, imm.value());
            func.dfg[inst] = InstructionData::IntCompare {
                opcode: Opcode::Icmp,
                cond,
                args: [arg, k],
            };
        }
        _ => return Ok(false),
    }
    Ok(true)
}

/// Replace the operands of `inst` by `data`, which produces a single value,
/// and return the original results. The first one is reattached to `inst`.
fn rewrite_first_result(func: &mut Function, inst: Inst, data: InstructionData) -> Vec<Value> {
    let results = func.dfg.detach_results(inst);
    func.dfg[inst] = data;
    func.dfg.attach_result(inst, results[0]);
    results
}

/// Attach `value` as the result of a new `data` instruction after `after`.
fn define_after(func: &mut Function, after: Inst, data: InstructionData, value: Value) {
    let inst = InsertBuilder::after(func, after).build_without_results(data);
    func.dfg.attach_result(inst, value);
}

fn binary(opcode: Opcode, x: Value, y: Value) -> InstructionData {
    InstructionData::Binary { opcode, args: [x, y] }
}

fn ult(x: Value, y: Value) -> InstructionData {
    InstructionData::IntCompare {
        opcode: Opcode::Icmp,
        cond: IntCC::UnsignedLessThan,
        args: [x, y],
    }
}

/// `a, c = iadd_cout x, y` becomes `a = iadd x, y; c = icmp ult a, x`.
fn add_carry_out(func: &mut Function, inst: Inst, x: Value, y: Value) {
    let results = rewrite_first_result(func, inst, binary(Opcode::Iadd, x, y));
    define_after(func, inst, ult(results[0], x), results[1]);
}

/// `a, b = isub_bout x, y` becomes `a = isub x, y; b = icmp ult x, y`.
fn sub_borrow_out(func: &mut Function, inst: Inst, x: Value, y: Value) {
    let results = rewrite_first_result(func, inst, binary(Opcode::Isub, x, y));
    define_after(func, inst, ult(x, y), results[1]);
}

/// `iadd_cin` and `isub_bin`: apply the operation, then add or subtract the
/// incoming flag as an integer.
fn with_carry_in(func: &mut Function, inst: Inst, opcode: Opcode, x: Value, y: Value, flag: Value) {
    let ty = func.dfg.value_type(x);
    let mut pos = InsertBuilder::before(func, inst);
    let partial = pos.binary(opcode, x, y);
    let flag = pos.unary_typed(Opcode::Bint, ty, flag);
    func.dfg[inst] = binary(opcode, partial, flag);
}

/// `a, c = iadd_carry x, y, ci`. Either of the two additions can carry.
fn add_carry(func: &mut Function, inst: Inst, x: Value, y: Value, carry_in: Value) {
    let ty = func.dfg.value_type(x);
    let mut pos = InsertBuilder::before(func, inst);
    let partial = pos.binary(Opcode::Iadd, x, y);
    let first = pos.icmp(IntCC::UnsignedLessThan, partial, x);
    let carry_in = pos.unary_typed(Opcode::Bint, ty, carry_in);
    let results = rewrite_first_result(func, inst, binary(Opcode::Iadd, partial, carry_in));
    let mut pos = InsertBuilder::after(func, inst);
    let second = pos.icmp(IntCC::UnsignedLessThan, results[0], partial);
    let carry = pos.build_without_results(binary(Opcode::Bor, first, second));
    func.dfg.attach_result(carry, results[1]);
}

/// `a, b = isub_borrow x, y, bi`. Either of the two subtractions can borrow.
fn sub_borrow(func: &mut Function, inst: Inst, x: Value, y: Value, borrow_in: Value) {
    let ty = func.dfg.value_type(x);
    let mut pos = InsertBuilder::before(func, inst);
    let partial = pos.binary(Opcode::Isub, x, y);
    let first = pos.icmp(IntCC::UnsignedLessThan, x, y);
    let borrow_in = pos.unary_typed(Opcode::Bint, ty, borrow_in);
    let results = rewrite_first_result(func, inst, binary(Opcode::Isub, partial, borrow_in));
    let mut pos = InsertBuilder::after(func, inst);
    let second = pos.icmp(IntCC::UnsignedLessThan, partial, borrow_in);
    let borrow = pos.build_without_results(binary(Opcode::Bor, first, second));
    func.dfg.attach_result(borrow, results[1]);
}

/// `c = band_not a, b` becomes `t = bnot b; c = band a, t`.
fn inverted_operand(func: &mut Function, inst: Inst, opcode: Opcode, x: Value, y: Value) {
    let inverted = InsertBuilder::before(func, inst).unary(Opcode::Bnot, y);
    func.dfg[inst] = binary(opcode, x, inverted);
}

/// Rotates combine two shifts: `rotl x, y = (x << y) | (x >> (bits - y))`.
fn rotate(func: &mut Function, inst: Inst, first: Opcode, second: Opcode, x: Value, y: Value) {
    let bits = i64::from(func.dfg.value_type(x).bits());
    let mut pos = InsertBuilder::before(func, inst);
    let high = pos.binary(first, x, y);
    let rest = pos.binary_imm(Opcode::IrsubImm, y, bits);
    let low = pos.binary(second, x, rest);
    func.dfg[inst] = binary(Opcode::Bor, high, low);
}

/// Repeat an 8-bit pattern across a value of `bits` bits.
fn splat(byte: u8, bits: u32) -> i64 {
    let pattern = u64::from(byte) * 0x0101_0101_0101_0101;
    if bits >= 64 {
        pattern as i64
    } else {
        (pattern & ((1u64 << bits) - 1)) as i64
    }
}

/// Population count by summing bit fields of growing width.
fn popcount(func: &mut Function, inst: Inst, x: Value) {
    let bits = func.dfg.value_type(x).bits();
    let mut pos = InsertBuilder::before(func, inst);

    let odd = pos.binary_imm(Opcode::UshrImm, x, 1);
    let odd = pos.binary_imm(Opcode::BandImm, odd, splat(0x55, bits));
    let pairs = pos.binary(Opcode::Isub, x, odd);

    let low = pos.binary_imm(Opcode::BandImm, pairs, splat(0x33, bits));
    let high = pos.binary_imm(Opcode::UshrImm, pairs, 2);
    let high = pos.binary_imm(Opcode::BandImm, high, splat(0x33, bits));
    let nibbles = pos.binary(Opcode::Iadd, low, high);

    let shifted = pos.binary_imm(Opcode::UshrImm, nibbles, 4);
    let bytes = pos.binary(Opcode::Iadd, nibbles, shifted);
    let mut sum = pos.binary_imm(Opcode::BandImm, bytes, splat(0x0f, bits));

    let mut shift = 8;
    while shift < bits {
        let shifted = pos.binary_imm(Opcode::UshrImm, sum, i64::from(shift));
        sum = pos.binary(Opcode::Iadd, sum, shifted);
        shift *= 2;
    }
    func.dfg[inst] = InstructionData::BinaryImm {
        opcode: Opcode::BandImm,
        arg: sum,
        imm: Imm64::new(0x7f),
    };
}

/// `v = select c, a, b` splits the EBB after the select and passes the chosen
/// operand to the second half, which receives `v` as its parameter.
fn select(func: &mut Function, inst: Inst, cond: Value, a: Value, b: Value) -> CodegenResult<()> {
    let ebb = func
        .layout
        .inst_ebb(inst)
        .ok_or_else(|| CodegenError::internal(inst, "select is not in the layout"))?;
    let next = func
        .layout
        .inst_position(inst)
        .and_then(|pos| func.layout.ebb_insts(ebb).get(pos + 1).copied())
        .ok_or_else(|| CodegenError::internal(inst, "select cannot end an EBB"))?;

    let join = func.dfg.make_ebb();
    func.layout.split_ebb(join, next);
    for value in func.dfg.detach_results(inst) {
        func.dfg.attach_ebb_param(join, value);
    }
    func.dfg[inst] = InstructionData::Branch {
        opcode: Opcode::Brnz,
        arg: cond,
        destination: join,
        args: vec![a],
    };
    InsertBuilder::at_end(func, ebb).jump(join, vec![b]);
    Ok(())
}
