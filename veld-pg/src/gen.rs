//! SELECT generation for planned queries, and the backend that runs
//! them.

use std::time::Instant;

use veld_core::{Doc, JobKind, Project, Sym, Type, Value};

use crate::client::{query_vals, Client};
use crate::error::{PgError, PgResult};
use crate::plan::{analyse, Batch, QueryKind};
use crate::scan::{scan_many, scan_one};
use crate::write::{is_key, write_expr, ExtParam, Resolved, SqlWriter, Translate};

/// Resolves symbols inside a planned query: `.key` against the owning
/// query's alias, `..key` against its parent's.
pub struct JobTranslator<'a> {
    pub batch: &'a Batch,
}

impl Translate for JobTranslator<'_> {
    fn translate(&mut self, env: usize, sym: &Sym) -> PgResult<Resolved> {
        if let Some(key) = sym.name.strip_prefix("..") {
            let parent = self.batch.all[env]
                .parent
                .ok_or_else(|| PgError::unexpected(format!("no parent scope for {}", sym.name)))?;
            return Ok(Resolved::Name(self.batch.col_ref(parent, key)));
        }
        if let Some(key) = sym.name.strip_prefix('.') {
            return Ok(Resolved::Name(self.batch.col_ref(env, key)));
        }
        if is_key(&sym.name) {
            return Ok(Resolved::Name(sym.name.clone()));
        }
        Ok(Resolved::External { name: sym.name.clone(), val: None })
    }
}

/// Generates the SELECT statement for one planned query, returning the
/// SQL text and the captured external parameters.
pub fn gen_query(batch: &Batch, qi: usize) -> PgResult<(String, Vec<ExtParam>)> {
    let mut trans = JobTranslator { batch };
    let mut w = SqlWriter::new(&mut trans);
    gen_select(&mut w, batch, qi)?;
    let params = std::mem::take(&mut w.params);
    Ok((w.finish(), params))
}

fn gen_select(w: &mut SqlWriter, b: &Batch, qi: usize) -> PgResult<()> {
    let q = &b.all[qi];
    w.push_str("SELECT ");
    let mut suf = "";
    if q.kind.contains(QueryKind::COUNT) {
        w.push_str("count(*)");
        if q.job.lim != 0 || q.job.off != 0 {
            // bound the counted rows in a subselect
            suf = ") _";
            w.push_str(" FROM (SELECT TRUE");
        }
    } else if q.kind.contains(QueryKind::SCALAR) {
        for c in &q.cols {
            if let Some(e) = &c.expr {
                write_expr(w, c.query, e)?;
            }
        }
    } else if q.cols.is_empty() {
        w.push_str("FALSE");
    } else {
        for (i, c) in q.cols.iter().enumerate() {
            if i > 0 {
                w.push_str(", ");
            }
            if let Some(si) = c.sub {
                gen_inlined(w, b, si)?;
                w.push_str(") as ");
                w.push_str(&c.key);
            } else if let Some(e) = &c.expr {
                write_expr(w, c.query, e)?;
                w.push_str(" as ");
                w.push_str(&c.key);
            } else {
                if let Some(a) = b.alias.get(&c.query) {
                    w.push_str(a);
                    w.push('.');
                }
                w.push_str(&c.key);
            }
        }
    }
    gen_from(w, b, qi, &mut 0);
    gen_where(w, b, qi, &mut 0)?;
    gen_common(w, b, qi)?;
    w.push_str(suf);
    Ok(())
}

/// An inlined correlated subquery, rendered inside the select list.
/// Many-valued results are aggregated with jsonb_agg.
fn gen_inlined(w: &mut SqlWriter, b: &Batch, si: usize) -> PgResult<()> {
    let sub = &b.all[si];
    w.push('(');
    if sub.kind.contains(QueryKind::SCALAR) && !sub.kind.contains(QueryKind::COUNT) {
        if sub.kind.contains(QueryKind::MANY) {
            w.push_str("SELECT jsonb_agg(");
            if let Some(e) = &sub.cols[0].expr {
                write_expr(w, sub.cols[0].query, e)?;
            }
            w.push(')');
        }
        gen_from(w, b, si, &mut 0);
        gen_where(w, b, si, &mut 0)?;
        gen_common(w, b, si)?;
    } else {
        if !sub.kind.contains(QueryKind::COUNT) {
            w.push_str("SELECT jsonb_agg(_) FROM (");
        }
        gen_select(w, b, si)?;
        if !sub.kind.intersects(QueryKind::SCALAR | QueryKind::COUNT) {
            w.push_str(") _");
        }
    }
    Ok(())
}

fn gen_from(w: &mut SqlWriter, b: &Batch, qi: usize, i: &mut usize) {
    if *i > 0 {
        w.push_str(", ");
    } else {
        w.push_str(" FROM ");
    }
    w.push_str(&b.as_ref(qi));
    *i += 1;
    for &ji in &b.all[qi].join {
        gen_from(w, b, ji, i);
    }
}

fn gen_where(w: &mut SqlWriter, b: &Batch, qi: usize, i: &mut usize) -> PgResult<()> {
    for whr in &b.all[qi].job.whr {
        w.push_str(if *i == 0 { " WHERE " } else { " AND " });
        *i += 1;
        write_expr(w, qi, whr)?;
    }
    for &ji in &b.all[qi].join {
        gen_where(w, b, ji, i)?;
    }
    Ok(())
}

fn gen_common(w: &mut SqlWriter, b: &Batch, qi: usize) -> PgResult<()> {
    let job = &b.all[qi].job;
    if !job.ord.is_empty() {
        w.push_str(" ORDER BY ");
        for (i, ord) in job.ord.iter().enumerate() {
            if i > 0 {
                w.push_str(", ");
            }
            w.push_str(ord.key.trim_start_matches('.'));
            if ord.desc {
                w.push_str(" DESC");
            }
        }
    }
    let mut lim = job.lim;
    if job.kind == JobKind::One {
        lim = 1;
    }
    if lim > 0 {
        w.push_str(&format!(" LIMIT {lim}"));
    }
    if job.off > 0 {
        w.push_str(&format!(" OFFSET {}", job.off));
    }
    Ok(())
}

/// A query backend over one project: plans documents, generates SQL and
/// scans the results.
pub struct Backend {
    pub project: Project,
}

impl Backend {
    pub fn new(project: Project) -> Backend {
        Backend { project }
    }

    /// Executes all root queries of a document and returns their result
    /// values in order.
    pub async fn exec_doc<C: Client>(&self, c: &mut C, doc: &Doc) -> PgResult<Vec<Value>> {
        let batch = analyse(&self.project, doc)?;
        let mut res = Vec::with_capacity(batch.list.len());
        for &qi in &batch.list {
            res.push(self.exec_query(c, &batch, qi).await?);
        }
        Ok(res)
    }

    async fn exec_query<C: Client>(&self, c: &mut C, batch: &Batch, qi: usize) -> PgResult<Value> {
        let (sql, params) = gen_query(batch, qi)?;
        let mut args = Vec::with_capacity(params.len());
        for p in params {
            match p.val {
                Some(v) => args.push(v),
                None => {
                    return Err(PgError::unexpected(format!(
                        "unexpected external param {}",
                        p.name
                    )))
                }
            }
        }
        let start = Instant::now();
        let mut rows = query_vals(c, &sql, &args).await?;
        let q = &batch.all[qi];
        let scal = q.kind.contains(QueryKind::SCALAR);
        let res = if q.kind.contains(QueryKind::MANY) {
            let el = if scal { Type::data() } else { Type::obj(&q.job.ref_) };
            scan_many(&el, scal, &mut rows).await?
        } else {
            scan_one(scal, &mut rows).await?
        };
        tracing::debug!(sql = %sql, elapsed = ?start.elapsed(), "query");
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veld_core::{Doc, Expr, Field, Job, Kind, Model, Op, Schema};

    fn model(name: &str, cols: &[&str]) -> Model {
        Model {
            name: name.to_string(),
            schema: "prod".to_string(),
            kind: Kind::OBJ,
            elems: cols
                .iter()
                .map(|c| veld_core::Elem::new(c, Type::str()))
                .collect(),
            consts: vec![],
            indices: vec![],
            extra: None,
        }
    }

    fn fixture() -> Project {
        Project {
            name: "prod".to_string(),
            schemas: vec![Schema {
                name: "prod".to_string(),
                models: vec![
                    model("cat", &["id", "name"]),
                    model("prod", &["id", "name", "cat"]),
                    model("label", &["id", "name", "tmpl"]),
                ],
            }],
        }
    }

    fn sym(name: &str) -> Expr {
        Expr::sym(name, Type::str())
    }
    fn eq(a: Expr, b: Expr) -> Expr {
        Expr::call(Op::Eq, vec![a, b], Type::bool())
    }
    fn lit(v: &str) -> Expr {
        Expr::lit(Value::Str(v.to_string()))
    }

    fn cat_sel(job: Job) -> Job {
        job.field(Field::col("id")).field(Field::col("name"))
    }

    fn gen_one(doc: &Doc) -> String {
        let batch = analyse(&fixture(), doc).unwrap();
        let (sql, _) = gen_query(&batch, batch.list[0]).unwrap();
        sql
    }

    #[test]
    fn test_count() {
        let doc = Doc { jobs: vec![Job::new(JobKind::Count, "prod.cat")] };
        assert_eq!(gen_one(&doc), "SELECT count(*) FROM prod.cat");
    }

    #[test]
    fn test_count_bounded() {
        let doc = Doc {
            jobs: vec![Job::new(JobKind::Count, "prod.cat").limit(5).offset(5)],
        };
        assert_eq!(
            gen_one(&doc),
            "SELECT count(*) FROM (SELECT TRUE FROM prod.cat LIMIT 5 OFFSET 5) _"
        );
    }

    #[test]
    fn test_basic_selects() {
        let doc = Doc { jobs: vec![cat_sel(Job::new(JobKind::Many, "prod.cat"))] };
        assert_eq!(gen_one(&doc), "SELECT id, name FROM prod.cat");

        let doc = Doc { jobs: vec![cat_sel(Job::new(JobKind::One, "prod.cat"))] };
        assert_eq!(gen_one(&doc), "SELECT id, name FROM prod.cat LIMIT 1");

        let doc = Doc { jobs: vec![cat_sel(Job::new(JobKind::One, "prod.cat")).offset(2)] };
        assert_eq!(gen_one(&doc), "SELECT id, name FROM prod.cat LIMIT 1 OFFSET 2");

        let doc = Doc {
            jobs: vec![Job::new(JobKind::One, "prod.cat")
                .field(Field::scalar("name", sym(".name")))],
        };
        assert_eq!(gen_one(&doc), "SELECT name FROM prod.cat LIMIT 1");

        let doc = Doc {
            jobs: vec![Job::new(JobKind::Many, "prod.cat").field(Field::col("id"))],
        };
        assert_eq!(gen_one(&doc), "SELECT id FROM prod.cat");
    }

    #[test]
    fn test_where_and_order() {
        let doc = Doc {
            jobs: vec![cat_sel(
                Job::new(JobKind::Many, "prod.cat")
                    .filter(Expr::call(Op::Gt, vec![sym(".name"), lit("B")], Type::bool())),
            )],
        };
        assert_eq!(gen_one(&doc), "SELECT id, name FROM prod.cat WHERE name > 'B'");

        let doc = Doc { jobs: vec![cat_sel(Job::new(JobKind::Many, "prod.cat")).asc("name")] };
        assert_eq!(gen_one(&doc), "SELECT id, name FROM prod.cat ORDER BY name");
    }

    #[test]
    fn test_expression_field() {
        let doc = Doc {
            jobs: vec![Job::new(JobKind::Many, "prod.cat")
                .field(Field::col("id"))
                .field(Field::expr(
                    "label",
                    Expr::call(Op::Cat, vec![lit("label: "), sym(".name")], Type::str()),
                ))],
        };
        assert_eq!(
            gen_one(&doc),
            "SELECT id, CONCAT('label: ', name) as label FROM prod.cat"
        );
    }

    #[test]
    fn test_joined_scalar_sub() {
        let doc = Doc {
            jobs: vec![Job::new(JobKind::One, "prod.prod")
                .filter(eq(sym(".name"), lit("A")))
                .field(Field::col("name"))
                .field(Field::sub(
                    "cname",
                    Job::new(JobKind::One, "prod.cat")
                        .filter(eq(sym(".id"), sym("..cat")))
                        .field(Field::scalar("name", sym(".name"))),
                ))],
        };
        assert_eq!(
            gen_one(&doc),
            "SELECT p.name, c.name as cname FROM prod.prod p, prod.cat c \
             WHERE p.name = 'A' AND c.id = p.cat LIMIT 1"
        );
    }

    #[test]
    fn test_joined_record_sub() {
        let doc = Doc {
            jobs: vec![Job::new(JobKind::One, "prod.prod")
                .filter(eq(sym(".id"), Expr::lit(Value::Int(1))))
                .field(Field::col("name"))
                .field(Field::sub(
                    "co",
                    cat_sel(
                        Job::new(JobKind::One, "prod.cat").filter(eq(sym(".id"), sym("..cat"))),
                    ),
                ))],
        };
        assert_eq!(
            gen_one(&doc),
            "SELECT p.name, c.id, c.name FROM prod.prod p, prod.cat c \
             WHERE p.id = 1 AND c.id = p.cat LIMIT 1"
        );
    }

    #[test]
    fn test_alias_blocked_by_key() {
        // the selection key c blocks the alias c, the sub gets c1
        let doc = Doc {
            jobs: vec![Job::new(JobKind::One, "prod.prod")
                .filter(eq(sym(".id"), Expr::lit(Value::Int(1))))
                .field(Field::col("name"))
                .field(Field::sub(
                    "c",
                    Job::new(JobKind::One, "prod.cat")
                        .filter(eq(sym(".id"), sym("..cat")))
                        .field(Field::scalar("name", sym(".name"))),
                ))],
        };
        assert_eq!(
            gen_one(&doc),
            "SELECT p.name, c1.name as c FROM prod.prod p, prod.cat c1 \
             WHERE p.id = 1 AND c1.id = p.cat LIMIT 1"
        );
    }

    fn b_or_c() -> Expr {
        Expr::call(
            Op::Or,
            vec![eq(sym(".name"), lit("b")), eq(sym(".name"), lit("c"))],
            Type::bool(),
        )
    }

    #[test]
    fn test_inlined_count_sub() {
        let doc = Doc {
            jobs: vec![cat_sel(Job::new(JobKind::Many, "prod.cat").filter(b_or_c()))
                .field(Field::sub(
                    "prods",
                    Job::new(JobKind::Count, "prod.prod").filter(eq(sym(".cat"), sym("..id"))),
                ))],
        };
        assert_eq!(
            gen_one(&doc),
            "SELECT c.id, c.name, (SELECT count(*) FROM prod.prod p WHERE p.cat = c.id) \
             as prods FROM prod.cat c WHERE c.name = 'b' OR c.name = 'c'"
        );
    }

    #[test]
    fn test_inlined_scalar_many_sub() {
        let doc = Doc {
            jobs: vec![cat_sel(Job::new(JobKind::Many, "prod.cat").filter(b_or_c()))
                .field(Field::sub(
                    "prods",
                    Job::new(JobKind::Many, "prod.prod")
                        .filter(eq(sym(".cat"), sym("..id")))
                        .field(Field::scalar("id", sym(".id"))),
                ))],
        };
        assert_eq!(
            gen_one(&doc),
            "SELECT c.id, c.name, (SELECT jsonb_agg(p.id) FROM prod.prod p \
             WHERE p.cat = c.id) as prods FROM prod.cat c \
             WHERE c.name = 'b' OR c.name = 'c'"
        );
    }

    #[test]
    fn test_inlined_record_many_sub() {
        let doc = Doc {
            jobs: vec![cat_sel(Job::new(JobKind::Many, "prod.cat").filter(b_or_c()))
                .field(Field::sub(
                    "prods",
                    Job::new(JobKind::Many, "prod.prod")
                        .filter(eq(sym(".cat"), sym("..id")))
                        .field(Field::col("id"))
                        .field(Field::col("name")),
                ))],
        };
        assert_eq!(
            gen_one(&doc),
            "SELECT c.id, c.name, (SELECT jsonb_agg(_) FROM (SELECT p.id, p.name \
             FROM prod.prod p WHERE p.cat = c.id) _) as prods FROM prod.cat c \
             WHERE c.name = 'b' OR c.name = 'c'"
        );
    }
}
