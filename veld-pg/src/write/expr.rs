//! Rendering expression trees as SQL.
//!
//! Most operators of the expression language have a direct postgresql
//! counterpart. Custom resolvers must be handled before calling into
//! this module.

use veld_core::{Expr, Kind, List, Op, Value};

use super::lit::{quote, write_array};
use super::{
    write_val, zero_strings, SqlWriter, PREC_ADD, PREC_AND, PREC_CMP, PREC_DEF, PREC_IN,
    PREC_IS, PREC_MUL, PREC_NOT, PREC_OR,
};
use crate::error::{PgError, PgResult};
use crate::oid::type_name;

/// Writes the expression `e`. The `env` selects the resolution scope for
/// symbols.
pub fn write_expr(w: &mut SqlWriter, env: usize, e: &Expr) -> PgResult<()> {
    match e {
        Expr::Sym(s) => w.write_sym(env, s),
        Expr::Lit(l) => write_val(w, &l.typ, &l.val),
        Expr::Typ(t) => Err(PgError::unexpected(format!("unexpected type literal {t:?}"))),
        Expr::Call(c) => write_call(w, env, &c.op, &c.args),
    }
}

fn write_call(w: &mut SqlWriter, env: usize, op: &Op, args: &[Expr]) -> PgResult<()> {
    match op {
        Op::Or => write_logic(w, env, args, " OR ", false, PREC_OR),
        Op::And | Op::Ok => write_logic(w, env, args, " AND ", false, PREC_AND),
        Op::Not => write_logic(w, env, args, " AND ", true, PREC_AND),
        // a guaranteed runtime error, only useful to make test queries
        // fail when a branch is actually evaluated
        Op::Err => {
            let g = w.open_prec(PREC_CMP);
            w.push_str(".321/0");
            w.close_prec(g);
            Ok(())
        }
        Op::Add => write_arith(w, env, args, " + ", PREC_ADD),
        Op::Sub => write_arith(w, env, args, " - ", PREC_ADD),
        Op::Mul => write_arith(w, env, args, " * ", PREC_MUL),
        Op::Div => write_arith(w, env, args, " / ", PREC_MUL),
        Op::Rem => write_arith(w, env, args, " % ", PREC_MUL),
        Op::Abs => write_fn(w, env, args, "ABS", ""),
        Op::Neg => write_neg(w, env, args),
        Op::Min => write_fn(w, env, args, "LEAST", ""),
        Op::Max => write_fn(w, env, args, "GREATEST", ""),
        Op::Eq => write_eq(w, env, args, " = ", false),
        Op::Ne => write_eq(w, env, args, " != ", false),
        Op::Equal => write_eq(w, env, args, " = ", true),
        Op::Lt => write_cmp(w, env, args, " < "),
        Op::Ge => write_cmp(w, env, args, " >= "),
        Op::Gt => write_cmp(w, env, args, " > "),
        Op::Le => write_cmp(w, env, args, " <= "),
        Op::In => write_in(w, env, args, false),
        Op::Ni => write_in(w, env, args, true),
        Op::If => write_if(w, env, args),
        Op::Swt => write_swt(w, env, args),
        Op::Df => write_fn(w, env, args, "COALESCE", ""),
        Op::Cat => write_fn(w, env, args, "CONCAT", ""),
        Op::Sep => write_sep(w, env, args),
        // json is valid veld notation that postgres understands
        Op::Veld | Op::Json => write_json(w, env, args),
        Op::Make => write_make(w, env, args),
        Op::Len => write_len(w, env, args),
        Op::Index => write_fn(w, env, args, "strpos", ""),
        Op::Prefix => write_like(w, env, args, false, 1),
        Op::Suffix => write_like(w, env, args, false, 2),
        Op::Contains => write_like(w, env, args, false, 3),
        Op::Upper => write_fn(w, env, args, "upper", ""),
        Op::Lower => write_fn(w, env, args, "lower", ""),
        Op::Trim => write_fn(w, env, args, "trim", "both ' \t' from "),
        Op::Like => write_like(w, env, args, false, 0),
        Op::Ilike => write_like(w, env, args, true, 0),
    }
}

fn write_each(w: &mut SqlWriter, env: usize, args: &[Expr], sep: &str) -> PgResult<()> {
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            w.push_str(sep);
        }
        write_expr(w, env, a)?;
    }
    Ok(())
}

fn write_logic(
    w: &mut SqlWriter,
    env: usize,
    args: &[Expr],
    op: &str,
    not: bool,
    prec: u8,
) -> PgResult<()> {
    let g = w.open_prec(prec);
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            w.push_str(op);
        }
        write_bool(w, env, not, a)?;
    }
    w.close_prec(g);
    Ok(())
}

fn write_arith(w: &mut SqlWriter, env: usize, args: &[Expr], op: &str, prec: u8) -> PgResult<()> {
    let g = w.open_prec(prec);
    write_each(w, env, args, op)?;
    w.close_prec(g);
    Ok(())
}

fn write_fn(w: &mut SqlWriter, env: usize, args: &[Expr], name: &str, pre: &str) -> PgResult<()> {
    let g = w.open_prec(PREC_DEF);
    w.push_str(name);
    w.push('(');
    w.push_str(pre);
    write_each(w, env, args, ", ")?;
    w.push(')');
    w.close_prec(g);
    Ok(())
}

fn write_neg(w: &mut SqlWriter, env: usize, args: &[Expr]) -> PgResult<()> {
    let fst = args
        .first()
        .ok_or_else(|| PgError::unexpected("empty neg expression"))?;
    if let Expr::Lit(l) = fst {
        let s = match &l.val {
            Value::Int(n) => n.to_string(),
            Value::Real(n) => n.to_string(),
            v => return Err(PgError::unexpected(format!("neg of non-number {v:?}"))),
        };
        // fold the sign into the literal
        match s.strip_prefix('-') {
            Some(pos) => w.push_str(pos),
            None => {
                w.push('-');
                w.push_str(&s);
            }
        }
        return Ok(());
    }
    w.push('-');
    write_expr(w, env, fst)
}

fn write_eq(w: &mut SqlWriter, env: usize, args: &[Expr], op: &str, strict: bool) -> PgResult<()> {
    let guard = (args.len() > 2).then(|| w.open_prec(PREC_AND));
    let fst = w.capture(|w| write_expr(w, env, &args[0]))?;
    for (i, arg) in args[1..].iter().enumerate() {
        if i > 0 {
            w.push_str(" AND ");
        }
        if strict {
            let oth = w.capture(|w| write_expr(w, env, arg))?;
            w.push_str(&format!(
                "({fst}{op}{oth} AND pg_typeof({fst}){op}pg_typeof({oth}))"
            ));
        } else {
            let g = w.open_prec(PREC_CMP);
            w.push_str(&fst);
            w.push_str(op);
            write_expr(w, env, arg)?;
            w.close_prec(g);
        }
    }
    if let Some(g) = guard {
        w.close_prec(g);
    }
    Ok(())
}

fn write_cmp(w: &mut SqlWriter, env: usize, args: &[Expr], op: &str) -> PgResult<()> {
    let guard = (args.len() > 2).then(|| w.open_prec(PREC_AND));
    let mut last = w.capture(|w| write_expr(w, env, &args[0]))?;
    for (i, arg) in args[1..].iter().enumerate() {
        if i > 0 {
            w.push_str(" AND ");
        }
        let g = w.open_prec(PREC_CMP);
        let oth = w.capture(|w| write_expr(w, env, arg))?;
        w.push_str(&last);
        w.push_str(op);
        w.push_str(&oth);
        w.close_prec(g);
        last = oth;
    }
    if let Some(g) = guard {
        w.close_prec(g);
    }
    Ok(())
}

fn write_in(w: &mut SqlWriter, env: usize, args: &[Expr], not: bool) -> PgResult<()> {
    let last = w.capture(|w| write_expr(w, env, &args[0]))?;
    let targets = &args[1..];
    let guard = (targets.len() > 1).then(|| w.open_prec(PREC_AND));
    for (i, arg) in targets.iter().enumerate() {
        let g = w.open_prec(PREC_IN);
        if i > 0 {
            w.push_str(if not { " AND " } else { " OR " });
        }
        w.push_str(&last);
        match arg {
            Expr::Lit(l) => {
                let list = match &l.val {
                    Value::List(list) => list,
                    v => return Err(PgError::unexpected(format!("expect list got {v:?}"))),
                };
                w.push_str(if not { " NOT IN (" } else { " IN (" });
                for (j, el) in list.vals.iter().enumerate() {
                    if j > 0 {
                        w.push_str(", ");
                    }
                    write_val(w, &list.el, el)?;
                }
                w.push(')');
            }
            _ => {
                w.push_str(if not { " != ALL(" } else { " = ANY(" });
                write_expr(w, env, arg)?;
                w.push(')');
            }
        }
        w.close_prec(g);
    }
    if let Some(g) = guard {
        w.close_prec(g);
    }
    Ok(())
}

fn write_if(w: &mut SqlWriter, env: usize, args: &[Expr]) -> PgResult<()> {
    let g = w.open_prec(PREC_OR);
    w.push_str("CASE");
    let has_else = args.len() % 2 == 1;
    let pairs = if has_else { &args[..args.len() - 1] } else { args };
    for pair in pairs.chunks(2) {
        w.push_str(" WHEN ");
        write_bool(w, env, false, &pair[0])?;
        w.push_str(" THEN ");
        write_expr(w, env, &pair[1])?;
    }
    if has_else {
        w.push_str(" ELSE ");
        write_expr(w, env, &args[args.len() - 1])?;
    }
    w.push_str(" END");
    w.close_prec(g);
    Ok(())
}

fn write_swt(w: &mut SqlWriter, env: usize, args: &[Expr]) -> PgResult<()> {
    let g = w.open_prec(PREC_DEF);
    let fst = w.capture(|w| write_expr(w, env, &args[0]))?;
    w.push_str("CASE");
    let rest = &args[1..];
    let has_else = rest.len() % 2 == 1;
    let pairs = if has_else { &rest[..rest.len() - 1] } else { rest };
    for pair in pairs.chunks(2) {
        w.push_str(&format!(" WHEN {fst} = "));
        write_expr(w, env, &pair[0])?;
        w.push_str(" THEN ");
        write_expr(w, env, &pair[1])?;
    }
    if has_else {
        w.push_str(" ELSE ");
        write_expr(w, env, &rest[rest.len() - 1])?;
    }
    w.push_str(" END");
    w.close_prec(g);
    Ok(())
}

fn write_sep(w: &mut SqlWriter, env: usize, args: &[Expr]) -> PgResult<()> {
    let sep = match &args[0] {
        Expr::Lit(l) => format!(", {}, ", quote(&l.val.to_str()?)),
        e => {
            let s = w.capture(|w| write_expr(w, env, e))?;
            format!(", {s}, ")
        }
    };
    w.push_str("CONCAT(");
    write_each(w, env, &args[1..], &sep)?;
    w.push(')');
    Ok(())
}

fn write_json(w: &mut SqlWriter, env: usize, args: &[Expr]) -> PgResult<()> {
    match &args[0] {
        Expr::Lit(l) => {
            let json = l.val.to_json()?;
            w.push_str(&quote(&json));
        }
        e => write_expr(w, env, e)?,
    }
    w.push_str("::jsonb");
    Ok(())
}

fn write_make(w: &mut SqlWriter, env: usize, args: &[Expr]) -> PgResult<()> {
    let t = match args.first() {
        Some(Expr::Typ(t)) => t.clone(),
        _ => return Err(PgError::unexpected("make expression must start with a type")),
    };
    let rest = &args[1..];
    match rest {
        [] => {
            let (zero, _) = zero_strings(&t)?;
            w.push_str(zero);
        }
        [Expr::Lit(l)] => return write_val(w, &t, &l.val),
        [e] => write_expr(w, env, e)?,
        _ => {
            let mut vals = Vec::with_capacity(rest.len());
            for e in rest {
                match e {
                    Expr::Lit(l) => vals.push(l.val.clone()),
                    _ => return Err(PgError::unexpected("make array expects literals")),
                }
            }
            return write_array(w, &List::new(t.cont_el(), vals));
        }
    }
    w.push_str(&format!("::{}", type_name(&t)?));
    Ok(())
}

fn write_len(w: &mut SqlWriter, env: usize, args: &[Expr]) -> PgResult<()> {
    let fst = &args[0];
    if let Expr::Lit(l) = fst {
        let n = l.val.len().unwrap_or(0);
        w.push_str(&n.to_string());
        return Ok(());
    }
    let s = w.capture(|w| write_expr(w, env, fst))?;
    let t = fst.typ();
    let k = t.kind.data();
    if k.intersects(Kind::CHAR) {
        w.push_str(&format!("octet_length({s})"));
    } else if k.intersects(Kind::KEYR) {
        w.push_str(&format!("(SELECT COUNT(*) FROM jsonb_object_keys({s}))"));
    } else if k.intersects(Kind::IDXR) {
        let el = t.cont_el();
        if el.kind.data() == Kind::DATA {
            w.push_str(&format!("jsonb_array_length({s})"));
        } else {
            w.push_str(&format!("array_length({s}, 1)"));
        }
    } else {
        return Err(PgError::unexpected(format!("len of unexpected type {t:?}")));
    }
    Ok(())
}

fn write_like(w: &mut SqlWriter, env: usize, args: &[Expr], ign: bool, dir: u8) -> PgResult<()> {
    let g = w.open_prec(PREC_IN);
    write_expr(w, env, &args[0])?;
    w.push_str(if ign { " ilike " } else { " like " });
    if dir & 2 != 0 {
        w.push_str("'%'||");
    }
    if dir != 0 {
        // escape the pattern before adding wildcards
        w.push_str("replace(replace(replace(");
        write_expr(w, env, &args[1])?;
        w.push_str(r#", '\', '\\'), '_', '\_'), '%', '\%')"#);
    } else {
        write_expr(w, env, &args[1])?;
    }
    if dir & 1 != 0 {
        w.push_str("||'%'");
    }
    w.close_prec(g);
    Ok(())
}

/// Writes an operand of a logical operator, coercing non-boolean types
/// with a comparison against their zero value and none-typed operands
/// with `IS [NOT] NULL`.
fn write_bool(w: &mut SqlWriter, env: usize, not: bool, e: &Expr) -> PgResult<()> {
    let t = e.typ();
    if t.kind == Kind::BOOL {
        if not {
            let g = w.open_prec(PREC_NOT);
            w.push_str("NOT ");
            write_expr(w, env, e)?;
            w.close_prec(g);
            return Ok(());
        }
        return write_expr(w, env, e);
    }
    if t.kind.contains(Kind::NONE) {
        let g = w.open_prec(PREC_IS);
        write_expr(w, env, e)?;
        w.push_str(if not { " IS NULL" } else { " IS NOT NULL" });
        w.close_prec(g);
        return Ok(());
    }
    let (zero, alt) = zero_strings(&t)?;
    let guard = if !alt.is_empty() {
        Some(w.open_prec(if not { PREC_OR } else { PREC_AND }))
    } else if !zero.is_empty() {
        Some(w.open_prec(PREC_CMP))
    } else {
        None
    };
    write_expr(w, env, e)?;
    if !zero.is_empty() {
        let op = if not { " = " } else { " != " };
        let g = w.open_prec(PREC_CMP);
        w.push_str(op);
        w.push_str(zero);
        if !alt.is_empty() {
            w.push_str(if not { " OR " } else { " AND " });
            write_expr(w, env, e)?;
            w.push_str(op);
            w.push_str(alt);
        }
        w.close_prec(g);
    }
    if let Some(g) = guard {
        w.close_prec(g);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::ExpEnv;
    use chrono::{TimeZone, Utc};
    use veld_core::{Dict, KeyVal, Op, Type};

    fn sym(name: &str, typ: Type) -> Expr {
        Expr::sym(name, typ)
    }
    fn b(name: &str) -> Expr {
        sym(name, Type::bool())
    }
    fn i(name: &str) -> Expr {
        sym(name, Type::int())
    }
    fn s(name: &str) -> Expr {
        sym(name, Type::str())
    }
    fn lit_i(n: i64) -> Expr {
        Expr::lit(Value::Int(n))
    }
    fn lit_s(v: &str) -> Expr {
        Expr::lit(Value::Str(v.to_string()))
    }
    fn ints(ns: &[i64]) -> Expr {
        Expr::lit(Value::List(List::new(
            Type::int(),
            ns.iter().map(|n| Value::Int(*n)).collect(),
        )))
    }
    fn call(op: Op, args: Vec<Expr>, typ: Type) -> Expr {
        Expr::call(op, args, typ)
    }
    fn bcall(op: Op, args: Vec<Expr>) -> Expr {
        call(op, args, Type::bool())
    }
    fn icall(op: Op, args: Vec<Expr>) -> Expr {
        call(op, args, Type::int())
    }

    fn render(e: &Expr) -> String {
        let mut env = ExpEnv;
        let mut w = SqlWriter::new(&mut env);
        write_expr(&mut w, 0, e).unwrap();
        w.finish()
    }

    #[test]
    fn test_literals() {
        let uuid = uuid::Uuid::parse_str("4d85fc61-398b-4886-a396-b67b6453e431").unwrap();
        let cases = [
            (Expr::lit(Value::Null), "NULL"),
            (Expr::lit(Value::Bool(true)), "TRUE"),
            (Expr::lit(Value::Bool(false)), "FALSE"),
            (lit_i(23), "23"),
            (lit_i(-42), "-42"),
            (lit_s("test"), "'test'"),
            (Expr::lit(Value::Raw(b"test".to_vec())), "'test'::bytea"),
            (
                Expr::lit(Value::Uuid(uuid)),
                "'4d85fc61-398b-4886-a396-b67b6453e431'::uuid",
            ),
            (
                Expr::lit(Value::Time(Utc.with_ymd_and_hms(2019, 2, 11, 0, 0, 0).unwrap())),
                "'2019-02-11'::timestamptz",
            ),
            (
                Expr::lit(Value::Span(chrono::TimeDelta::minutes(65))),
                "'1h5m'::interval",
            ),
            (
                Expr::lit(Value::List(List::new(
                    Type::data(),
                    vec![Value::Null, Value::Bool(true)],
                ))),
                "'[null,true]'::jsonb",
            ),
            (ints(&[1, 2, 3]), "'{1,2,3}'::int8[]"),
            (
                Expr::lit(Value::List(List::new(
                    Type::str(),
                    vec![
                        Value::Str("a".to_string()),
                        Value::Str("b".to_string()),
                        Value::Str("'".to_string()),
                    ],
                ))),
                r#"'{"a","b","''"}'::text[]"#,
            ),
            (
                Expr::lit(Value::Dict(Dict::new(vec![
                    KeyVal::new("a", Value::Null),
                    KeyVal::new("b", Value::Bool(true)),
                ]))),
                r#"'{"a":null,"b":true}'::jsonb"#,
            ),
        ];
        for (e, want) in cases {
            assert_eq!(render(&e), want);
        }
    }

    #[test]
    fn test_logic() {
        let cases = [
            (bcall(Op::Or, vec![b("a"), b("b")]), "a OR b"),
            (bcall(Op::Not, vec![b("a"), b("b")]), "NOT a AND NOT b"),
            (bcall(Op::And, vec![i("x"), s("v")]), "x != 0 AND v != ''"),
            (
                bcall(Op::And, vec![bcall(Op::Or, vec![b("a"), b("b")]), b("c")]),
                "(a OR b) AND c",
            ),
            (
                bcall(Op::Or, vec![bcall(Op::And, vec![b("a"), b("b")]), b("c")]),
                "a AND b OR c",
            ),
        ];
        for (e, want) in cases {
            assert_eq!(render(&e), want);
        }
    }

    #[test]
    fn test_compare() {
        let cases = [
            (bcall(Op::Eq, vec![i("x"), i("y"), lit_i(1)]), "x = y AND x = 1"),
            (bcall(Op::Gt, vec![i("x"), i("y"), lit_i(1)]), "x > y AND y > 1"),
            (
                bcall(Op::Equal, vec![i("x"), lit_i(1)]),
                "(x = 1 AND pg_typeof(x) = pg_typeof(1))",
            ),
        ];
        for (e, want) in cases {
            assert_eq!(render(&e), want);
        }
    }

    #[test]
    fn test_in() {
        let t = sym("t", Type::list_of(Type::int()));
        let cases = [
            (
                bcall(Op::In, vec![i("x"), ints(&[1, 2, 3]), ints(&[4, 5])]),
                "x IN (1, 2, 3) OR x IN (4, 5)",
            ),
            (
                bcall(Op::In, vec![i("x"), t.clone(), ints(&[4, 5])]),
                "x = ANY(t) OR x IN (4, 5)",
            ),
            (
                bcall(Op::Ni, vec![i("x"), t, ints(&[4, 5])]),
                "x != ALL(t) AND x NOT IN (4, 5)",
            ),
        ];
        for (e, want) in cases {
            assert_eq!(render(&e), want);
        }
    }

    #[test]
    fn test_arith_precedence() {
        let cases = [
            (icall(Op::Add, vec![icall(Op::Add, vec![i("x"), lit_i(2)]), lit_i(3)]), "x + 2 + 3"),
            (icall(Op::Add, vec![icall(Op::Mul, vec![i("x"), lit_i(2)]), lit_i(3)]), "x * 2 + 3"),
            (icall(Op::Add, vec![lit_i(3), icall(Op::Mul, vec![i("x"), lit_i(2)])]), "3 + x * 2"),
            (icall(Op::Mul, vec![icall(Op::Add, vec![i("x"), lit_i(2)]), lit_i(3)]), "(x + 2) * 3"),
            (icall(Op::Mul, vec![lit_i(3), icall(Op::Add, vec![i("x"), lit_i(2)])]), "3 * (x + 2)"),
        ];
        for (e, want) in cases {
            assert_eq!(render(&e), want);
        }
    }

    #[test]
    fn test_calls() {
        let cases = [
            (
                call(Op::Cat, vec![lit_s("hell"), lit_s("o W"), lit_s("orld")], Type::str()),
                "CONCAT('hell', 'o W', 'orld')",
            ),
            (
                call(
                    Op::Sep,
                    vec![lit_s(" | "), lit_s("hell"), lit_s("o W"), lit_s("orld")],
                    Type::str(),
                ),
                "CONCAT('hell', ' | ', 'o W', ' | ', 'orld')",
            ),
            (
                icall(Op::Df, vec![i("x"), Expr::lit(Value::Null), lit_i(3)]),
                "COALESCE(x, NULL, 3)",
            ),
            (icall(Op::Min, vec![i("x"), i("y"), lit_i(3)]), "LEAST(x, y, 3)"),
            (icall(Op::Max, vec![i("x"), i("y"), lit_i(3)]), "GREATEST(x, y, 3)"),
        ];
        for (e, want) in cases {
            assert_eq!(render(&e), want);
        }
    }

    #[test]
    fn test_case_expressions() {
        let e = icall(
            Op::If,
            vec![
                bcall(Op::Eq, vec![s("v"), lit_s("a")]),
                i("x"),
                bcall(Op::Eq, vec![s("w"), lit_s("b")]),
                i("y"),
                lit_i(1),
            ],
        );
        assert_eq!(
            render(&e),
            "CASE WHEN v = 'a' THEN x WHEN w = 'b' THEN y ELSE 1 END"
        );
        let e = icall(
            Op::Swt,
            vec![s("v"), lit_s("a"), i("x"), lit_s("b"), i("y"), lit_i(1)],
        );
        assert_eq!(
            render(&e),
            "CASE WHEN v = 'a' THEN x WHEN v = 'b' THEN y ELSE 1 END"
        );
    }

    #[test]
    fn test_len() {
        let cases = [
            (icall(Op::Len, vec![lit_s("test")]), "4"),
            (icall(Op::Len, vec![ints(&[1, 2, 3])]), "3"),
            (icall(Op::Len, vec![s("v")]), "octet_length(v)"),
            (icall(Op::Len, vec![sym("s", Type::idxr())]), "jsonb_array_length(s)"),
            (
                icall(Op::Len, vec![sym("t", Type::list_of(Type::int()))]),
                "array_length(t, 1)",
            ),
            (
                icall(Op::Len, vec![sym("d", Type::dict())]),
                "(SELECT COUNT(*) FROM jsonb_object_keys(d))",
            ),
        ];
        for (e, want) in cases {
            assert_eq!(render(&e), want);
        }
    }

    #[test]
    fn test_like() {
        let e = bcall(Op::Like, vec![s("v"), lit_s("a%")]);
        assert_eq!(render(&e), "v like 'a%'");
        let e = bcall(Op::Prefix, vec![s("v"), lit_s("a")]);
        assert_eq!(
            render(&e),
            r#"v like replace(replace(replace('a', '\', '\\'), '_', '\_'), '%', '\%')||'%'"#
        );
        let e = bcall(Op::Contains, vec![s("v"), s("w")]);
        assert_eq!(
            render(&e),
            r#"v like '%'||replace(replace(replace(w, '\', '\\'), '_', '\_'), '%', '\%')||'%'"#
        );
        let e = bcall(Op::Ilike, vec![s("v"), lit_s("a%")]);
        assert_eq!(render(&e), "v ilike 'a%'");
    }

    #[test]
    fn test_make() {
        let e = call(
            Op::Make,
            vec![Expr::Typ(Type::list_of(Type::int())), lit_i(1), lit_i(2)],
            Type::list_of(Type::int()),
        );
        assert_eq!(render(&e), "'{1,2}'::int8[]");
        let e = call(Op::Make, vec![Expr::Typ(Type::int()), i("x")], Type::int());
        assert_eq!(render(&e), "x::int8");
    }

    #[test]
    fn test_err_marker() {
        assert_eq!(render(&icall(Op::Err, vec![])), ".321/0");
    }

    #[test]
    fn test_external_params() {
        let mut env = ExpEnv;
        let mut w = SqlWriter::new(&mut env);
        let e = bcall(Op::Eq, vec![i("x"), sym("$int1", Type::int())]);
        write_expr(&mut w, 0, &e).unwrap();
        assert_eq!(w.params.len(), 1);
        assert_eq!(w.params[0].name, "$int1");
        assert_eq!(w.finish(), "x = $1");

        // the same free symbol reuses its parameter index
        let mut env = ExpEnv;
        let mut w = SqlWriter::new(&mut env);
        let e = bcall(
            Op::And,
            vec![
                bcall(Op::Eq, vec![i("x"), sym("$int1", Type::int())]),
                bcall(Op::Eq, vec![i("y"), sym("$int1", Type::int())]),
            ],
        );
        write_expr(&mut w, 0, &e).unwrap();
        assert_eq!(w.params.len(), 1);
        assert_eq!(w.finish(), "x = $1 AND y = $1");
    }
}
