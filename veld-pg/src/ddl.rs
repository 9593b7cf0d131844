//! Schema DDL generation and project setup.

use veld_core::{Elem, ElemBits, Kind, Model, Project, Schema, Value};

use crate::client::{with_tx, Client, Db};
use crate::error::{PgError, PgResult};
use crate::oid::type_name;
use crate::write::{quote, unreserved, ExpEnv, SqlWriter};

/// Whether a model renders any DDL: enums always, obj models only when
/// flagged backup or topic.
fn has_ddl(m: &Model) -> bool {
    match m.kind.data() {
        k if k == Kind::ENUM => true,
        k if k == Kind::OBJ => m.has_flag("backup") || m.has_flag("topic"),
        _ => false,
    }
}

/// Renders the full DDL of a schema: `CREATE SCHEMA`, enum types and
/// tables for models flagged backup or topic, followed by their
/// indices.
pub fn write_schema(w: &mut SqlWriter, p: Option<&Project>, s: &Schema) -> PgResult<()> {
    // collect models first, we do not want to generate empty schemas
    let models: Vec<&Model> = s.models.iter().filter(|m| has_ddl(m)).collect();
    if models.is_empty() {
        w.push_str(&format!("-- schema {} has no enums or tables\n\n", s.name));
        return Ok(());
    }
    w.push_str(&format!("CREATE SCHEMA {};\n\n", s.name));
    for m in models {
        write_model(w, p, m)?;
        w.push_str("\n\n");
    }
    Ok(())
}

/// Renders the statements of one model: a `CREATE TYPE` for enums, or a
/// `CREATE TABLE` plus its index statements. The project is needed to
/// expand embedded object elements.
pub fn write_model(w: &mut SqlWriter, p: Option<&Project>, m: &Model) -> PgResult<()> {
    match m.kind.data() {
        k if k == Kind::ENUM => write_enum(w, m),
        _ => write_table(w, p, m),
    }
}

fn write_enum(w: &mut SqlWriter, m: &Model) -> PgResult<()> {
    w.push_str(&format!("CREATE TYPE {}.{} AS ENUM (", m.schema, check_ident(&m.key())));
    w.indent();
    // the zero constant first, then one constant per declared one
    w.push_str("''");
    for c in &m.consts {
        w.push_str(", ");
        w.push_str(&quote(&c.name.to_lowercase()));
    }
    w.dedent();
    w.push_str(");");
    Ok(())
}

fn write_table(w: &mut SqlWriter, p: Option<&Project>, m: &Model) -> PgResult<()> {
    w.push_str(&format!("CREATE TABLE {}.{} (", m.schema, check_ident(&m.key())));
    w.indent();
    for (i, el) in m.elems.iter().enumerate() {
        if i > 0 {
            w.push(',');
            w.break_line();
        }
        write_field(w, p, el)?;
    }
    w.dedent();
    w.push_str(");");
    write_indices(w, m);
    Ok(())
}

fn write_field(w: &mut SqlWriter, p: Option<&Project>, el: &Elem) -> PgResult<()> {
    let mut key = el.key();
    if key.is_empty() {
        let k = el.typ.kind.data();
        if k == Kind::ENUM || k == Kind::BITS {
            // anonymous enum elements take their column name from the
            // type reference
            key = el
                .typ
                .name
                .rsplit('.')
                .next()
                .unwrap_or_default()
                .to_lowercase();
        } else if k == Kind::OBJ {
            return write_embed(w, p, &el.typ.name);
        }
        if key.is_empty() {
            return Err(PgError::unexpected(format!(
                "unexpected embedded field type {:?}",
                el.typ
            )));
        }
    }
    w.push_str(&check_ident(&key));
    w.push(' ');
    let ts = type_name(&el.typ)?;
    if ts == "int8" && el.bits.contains(ElemBits::PK | ElemBits::AUTO) {
        w.push_str("serial8");
    } else {
        w.push_str(&ts);
    }
    if el.bits.contains(ElemBits::PK) {
        w.push_str(" primary key");
    } else if el.bits.contains(ElemBits::OPT) {
        w.push_str(" null");
    } else {
        w.push_str(" not null");
    }
    if el.bits.contains(ElemBits::UNIQ) {
        w.push_str(" unique");
    }
    if let Some(def) = el.extra.as_ref().and_then(|d| d.key("def")) {
        w.push_str(" default ");
        w.push_str(&default_literal(def)?);
    } else if !el.bits.intersects(ElemBits::PK | ElemBits::OPT)
        && el.typ.kind.contains(Kind::NONE)
    {
        // optional param behind a not-null column needs a zero default
        if let Some(def) = implicit_default(el.typ.kind) {
            w.push_str(" default ");
            w.push_str(def);
        }
    }
    if !el.ref_.is_empty() {
        w.push_str(&format!(" references {} deferrable", el.ref_.to_lowercase()));
    }
    Ok(())
}

/// Expands an embedded object's elements inline, recursively.
fn write_embed(w: &mut SqlWriter, p: Option<&Project>, ref_: &str) -> PgResult<()> {
    let qualified = match ref_.split_once('.') {
        Some((schema, key)) => format!("{}.{}", schema, key.to_lowercase()),
        None => ref_.to_lowercase(),
    };
    let m = p
        .and_then(|p| p.model(&qualified))
        .ok_or_else(|| PgError::unexpected(format!("no model for {ref_}")))?;
    for (i, el) in m.elems.iter().enumerate() {
        if i > 0 {
            w.push(',');
            w.break_line();
        }
        if el.key().is_empty() {
            write_embed(w, p, &el.typ.name)?;
            continue;
        }
        w.push_str(&check_ident(&el.key()));
        w.push(' ');
        w.push_str(&type_name(&el.typ)?);
        if el.bits.contains(ElemBits::OPT) || el.typ.kind.contains(Kind::NONE) {
            w.push_str(" null");
        } else {
            w.push_str(" not null");
        }
    }
    Ok(())
}

fn implicit_default(k: Kind) -> Option<&'static str> {
    let k = k.data();
    if k == Kind::BOOL {
        Some("false")
    } else if Kind::NUM.contains(k) && !k.is_empty() {
        Some("0")
    } else if Kind::CHAR.contains(k) && !k.is_empty() {
        Some("''")
    } else {
        None
    }
}

fn default_literal(v: &Value) -> PgResult<String> {
    Ok(match v {
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Real(n) => n.to_string(),
        Value::Str(s) => quote(s),
        v => return Err(PgError::unexpected(format!("unexpected default {v:?}"))),
    })
}

/// Index statements follow their table: one per element flagged idx,
/// plus the model's explicit multi-column indices. Index columns are
/// referenced by bare key, unquoted.
fn write_indices(w: &mut SqlWriter, m: &Model) {
    let qual = format!("{}.{}", m.schema, m.key());
    for el in &m.elems {
        if !el.bits.contains(ElemBits::IDX) {
            continue;
        }
        let key = el.key();
        w.push_str(&format!(
            "\nCREATE INDEX {}_{}_idx on {} ({});",
            m.key(),
            key,
            qual,
            key
        ));
    }
    for idx in &m.indices {
        let unique = if idx.unique { "UNIQUE " } else { "" };
        let suffix = if idx.unique { "uniq" } else { "idx" };
        let name = if idx.name.is_empty() {
            format!("{}_{}_{}", m.key(), idx.keys.join("_"), suffix)
        } else {
            idx.name.clone()
        };
        w.push_str(&format!(
            "\nCREATE {}INDEX {} on {} ({});",
            unique,
            name,
            qual,
            idx.keys.join(", ")
        ));
    }
}

/// Checks an identifier for the schema writer, logging reserved names.
fn check_ident(name: &str) -> String {
    let (name, ok) = unreserved(name);
    if ok {
        return name;
    }
    // log every reserved identifier whenever we generate a schema so
    // those names can be changed early
    tracing::warn!(ident = %name, "use of reserved postgresql ident");
    format!("\"{name}\"")
}

/// Creates all schemas and models of a project, dropping any previous
/// incarnation first.
pub async fn create_project<D: Db>(db: &mut D, p: &Project) -> PgResult<()> {
    with_tx(db, async |tx| {
        drop_project_tx(tx, p).await?;
        for s in &p.schemas {
            tx.exec(&format!("CREATE SCHEMA {}", s.name), &[]).await?;
            for m in &s.models {
                if !has_ddl(m) {
                    continue;
                }
                let mut env = ExpEnv;
                let mut w = SqlWriter::new(&mut env);
                write_model(&mut w, Some(p), m)?;
                tx.exec(&w.finish(), &[]).await?;
            }
        }
        Ok(())
    })
    .await
}

/// Drops the project's schemas, newest first.
pub async fn drop_project<D: Db>(db: &mut D, p: &Project) -> PgResult<()> {
    with_tx(db, async |tx| drop_project_tx(tx, p).await).await
}

async fn drop_project_tx<C: Client>(c: &mut C, p: &Project) -> PgResult<()> {
    for s in p.schemas.iter().rev() {
        c.exec(&format!("DROP SCHEMA IF EXISTS {} CASCADE", s.name), &[])
            .await?;
    }
    Ok(())
}

/// Loads fixture rows into the tables of a schema through the driver's
/// copy interface. The fixture maps model keys to lists of row records.
pub async fn copy_fixture<D: Db>(
    db: &mut D,
    s: &Schema,
    fix: &[(String, Vec<Vec<Value>>)],
) -> PgResult<()> {
    with_tx(db, async |tx| {
        for (key, rows) in fix {
            let m = s
                .model(key)
                .ok_or_else(|| PgError::unexpected(format!("no model {key}")))?;
            let cols: Vec<String> = m.elems.iter().map(|e| e.key()).collect();
            tx.copy_from(&m.qualified(), &cols, rows.clone()).await?;
        }
        Ok(())
    })
    .await
}
