//! Printing a parsed function gives back the text it was parsed from.

use ebbc_reader::parse_test;
use indoc::indoc;
use pretty_assertions::assert_eq;

fn roundtrip(text: &str) {
    let file = parse_test(text).unwrap();
    let printed: String = file
        .functions
        .iter()
        .map(|(func, details)| func.display(details.target.isa.as_deref()).to_string())
        .collect::<Vec<_>>()
        .join("\n");
    let source: String = text
        .lines()
        .filter(|line| !line.starts_with("isa ") && !line.starts_with("test "))
        .collect::<Vec<_>>()
        .join("\n");
    assert_eq!(printed.trim_end(), source.trim());
}

#[test]
fn branches_and_calls() {
    roundtrip(indoc! {"
        function %sum(i32, i32) -> i32 system_v {
            sig0 = (i32) -> i32 fast
            sig1 = (i64, f64) system_v
            fn0 = %callee sig0

        ebb0(v1: i32, v2: i32):
            v3 = iadd v1, v2
            brnz v3, ebb1(v3)
            v5 = call fn0(v1)
            br_icmp slt v5, v1, ebb1(v2)
            v6 = icmp_imm eq v5, -12
            v7 = bint.i32 v6
            jump ebb1(v7)

        ebb1(v4: i32):
            v8 = iconst.i32 0x0001_0000
            v9, v10 = iadd_cout v4, v8
            v11 = select v10, v9, v4
            return v11
        }
    "});
}

#[test]
fn floats_and_traps() {
    roundtrip(indoc! {"
        function %consts() system_v {
        ebb0:
            v0 = f32const 1.5
            v1 = f64const -inf
            v2 = f64const 1e-5
            v3 = fadd v1, v2
            v4 = bconst.b1 true
            trap
        }
    "});
}

#[test]
fn allocated_functions() {
    roundtrip(indoc! {"
        test regalloc
        isa riscv
        function %inc(i32 [%x10], i32 link [%x1]) -> i32 [%x10], i32 link [%x1] system_v {
        ebb0(v0: i32 [%x10], v1: i32 [%x1]):
            [%x5] v2 = iconst.i32 1
            [-4] v3 = spill v2
            [%x6] v4 = fill v3
            [%x10] v5 = iadd v0, v4
            return v5, v1
        }

        function %second() system_v {
        ebb0:
            return
        }
    "});
}
