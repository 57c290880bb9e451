//! andb-shell - line-oriented administrative shell over `andb::Engine`.
//!
//! Mirrors the teacher's `rustql` CLI shell shape (dot commands plus a
//! statement loop, `.help`, echo/bail toggles, interactive vs piped stdin)
//! but drives `Engine`'s `hot_*`/`bt_*`/transaction entry points directly
//! instead of a SQL parser — parsing and planning stay the out-of-scope
//! collaborator's job.

use std::env;
use std::io::{self, BufRead, IsTerminal, Write};

use andb::catalog::{TYPE_BIGINT, TYPE_BOOLEAN, TYPE_CHAR, TYPE_DOUBLE, TYPE_INTEGER, TYPE_REAL, TYPE_TEXT, TYPE_VARCHAR};
use andb::common::oid_range::DATABASE_ANDB;
use andb::{Engine, EngineConfig, Oid, TuplePointer, Value, Xid};

struct Shell {
    engine: Engine,
    echo: bool,
    bail: bool,
    data_dir: String,
}

impl Shell {
    fn new(data_dir: &str) -> Result<Self, String> {
        let engine = Engine::open(EngineConfig::new(data_dir)).map_err(|e| e.to_string())?;
        Ok(Self { engine, echo: false, bail: false, data_dir: data_dir.to_string() })
    }

    fn process_dot_command(&mut self, line: &str) -> Result<bool, String> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(true);
        }
        match parts[0] {
            ".quit" | ".exit" => return Ok(false),
            ".help" => print_help(),
            ".echo" => {
                if let Some(v) = parts.get(1) {
                    self.echo = matches!(*v, "on" | "1");
                } else {
                    println!("echo: {}", if self.echo { "on" } else { "off" });
                }
            }
            ".bail" => {
                if let Some(v) = parts.get(1) {
                    self.bail = matches!(*v, "on" | "1");
                } else {
                    println!("bail: {}", if self.bail { "on" } else { "off" });
                }
            }
            ".tables" => {
                for class in &self.engine.catalog.classes {
                    println!("{}", class.name);
                }
            }
            ".schema" => {
                let table = parts.get(1).copied();
                for class in &self.engine.catalog.classes {
                    if let Some(t) = table {
                        if class.name != t {
                            continue;
                        }
                    }
                    let attrs = self.engine.catalog.attributes_of(class.oid);
                    let cols: Vec<String> = attrs
                        .iter()
                        .map(|a| format!("{} {}{}", a.name, type_name(a.type_oid), if a.notnull { " not null" } else { "" }))
                        .collect();
                    println!("{} ({})", class.name, cols.join(", "));
                }
            }
            ".databases" => println!("main: {}", self.data_dir),
            ".checkpoint" => self.engine.checkpoint().map_err(|e| e.to_string())?,
            ".version" => println!("andb-shell 0.1.0"),
            other => return Err(format!("unknown command: {}", other)),
        }
        Ok(true)
    }

    /// Executes one non-dot line: `begin`, `commit <xid>`, `abort <xid>`,
    /// `create table NAME col:type[:notnull] ...`, `create index NAME ON
    /// TABLE column_index`, `insert <xid> TABLE v1 v2 ...`, `select TABLE`,
    /// `delete <xid> TABLE page slot`.
    fn execute_line(&mut self, line: &str) -> Result<(), String> {
        if self.echo {
            println!("{}", line);
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            return Ok(());
        }
        let result = match words[0] {
            "begin" => self.engine.begin_transaction().map(|xid| println!("xid {}", xid)).map_err(|e| e.to_string()),
            "commit" => parse_xid(&words).and_then(|xid| self.engine.commit_transaction(xid).map_err(|e| e.to_string())),
            "abort" => parse_xid(&words).and_then(|xid| self.engine.abort_transaction(xid).map_err(|e| e.to_string())),
            "create" if words.get(1) == Some(&"table") => self.create_table(&words),
            "create" if words.get(1) == Some(&"index") => self.create_index(&words),
            "insert" => self.insert(&words),
            "select" => self.select(&words),
            "delete" => self.delete(&words),
            other => Err(format!("unknown command: {}", other)),
        };
        if let Err(e) = &result {
            eprintln!("Error: {}", e);
        }
        result
    }

    fn create_table(&mut self, words: &[&str]) -> Result<(), String> {
        let name = words.get(2).ok_or("create table requires a name")?;
        let mut columns = Vec::new();
        for spec in &words[3..] {
            let parts: Vec<&str> = spec.split(':').collect();
            let col_name = parts.first().ok_or("empty column spec")?;
            let type_oid = type_oid_of(parts.get(1).copied().unwrap_or("integer"))?;
            let notnull = parts.get(2).copied() == Some("notnull");
            let length = match type_oid {
                t if t == TYPE_VARCHAR => 255,
                t if t == TYPE_TEXT => 0,
                _ => 8,
            };
            columns.push((col_name.to_string(), type_oid, length, notnull));
        }
        let oid = self.engine.create_table(name, &columns).map_err(|e| e.to_string())?;
        println!("table {} oid {}", name, oid);
        Ok(())
    }

    fn create_index(&mut self, words: &[&str]) -> Result<(), String> {
        let name = words.get(2).ok_or("create index requires a name")?;
        let on = words.get(3).copied();
        let table_name = words.get(4).ok_or("create index requires ON table")?;
        if on != Some("on") && on != Some("ON") {
            return Err("expected ON between index name and table".to_string());
        }
        let column_index: u32 = words.get(5).ok_or("create index requires a column index")?.parse().map_err(|_| "bad column index")?;
        let table_oid = self.table_oid(table_name)?;
        let oid = self.engine.create_index(name, table_oid, column_index, column_index).map_err(|e| e.to_string())?;
        println!("index {} oid {}", name, oid);
        Ok(())
    }

    fn insert(&mut self, words: &[&str]) -> Result<(), String> {
        let xid: Xid = words.get(1).ok_or("insert requires an xid")?.parse().map_err(|_| "bad xid")?;
        let table_name = words.get(2).ok_or("insert requires a table name")?;
        let table_oid = self.table_oid(table_name)?;
        let type_oids: Vec<Oid> = self.engine.catalog.attributes_of(table_oid).iter().map(|a| a.type_oid).collect();
        let raw = &words[3..];
        if raw.len() != type_oids.len() {
            return Err(format!("expected {} values, got {}", type_oids.len(), raw.len()));
        }
        let mut values = Vec::with_capacity(raw.len());
        for (text, type_oid) in raw.iter().zip(type_oids.iter()) {
            values.push(parse_value(text, *type_oid)?);
        }
        let ptr = self.engine.hot_insert(xid, table_oid, &values).map_err(|e| e.to_string())?;
        println!("inserted at {}:{}", ptr.page, ptr.slot);
        Ok(())
    }

    fn select(&mut self, words: &[&str]) -> Result<(), String> {
        let table_name = words.get(1).ok_or("select requires a table name")?;
        let table_oid = self.table_oid(table_name)?;
        let rows = self.engine.hot_select_all(table_oid).map_err(|e| e.to_string())?;
        for (ptr, values) in rows {
            let rendered: Vec<String> = values.iter().map(render_value).collect();
            println!("{}:{}\t{}", ptr.page, ptr.slot, rendered.join("\t"));
        }
        Ok(())
    }

    fn delete(&mut self, words: &[&str]) -> Result<(), String> {
        let xid: Xid = words.get(1).ok_or("delete requires an xid")?.parse().map_err(|_| "bad xid")?;
        let table_name = words.get(2).ok_or("delete requires a table name")?;
        let table_oid = self.table_oid(table_name)?;
        let page: u32 = words.get(3).ok_or("delete requires a page")?.parse().map_err(|_| "bad page")?;
        let slot: u32 = words.get(4).ok_or("delete requires a slot")?.parse().map_err(|_| "bad slot")?;
        let ok = self.engine.hot_delete(xid, table_oid, TuplePointer::new(page, slot)).map_err(|e| e.to_string())?;
        println!("{}", if ok { "deleted" } else { "not found" });
        Ok(())
    }

    fn table_oid(&self, name: &str) -> Result<Oid, String> {
        self.engine
            .catalog
            .find_class_by_name(DATABASE_ANDB, name)
            .map(|c| c.oid)
            .ok_or_else(|| format!("no such table: {}", name))
    }

    fn run_interactive(&mut self) -> io::Result<()> {
        let stdin = io::stdin();
        loop {
            print!("andb> ");
            io::stdout().flush()?;
            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                break;
            }
            if !self.dispatch(line.trim()) {
                break;
            }
        }
        Ok(())
    }

    fn run_stdin(&mut self) -> io::Result<()> {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            if !self.dispatch(line?.trim()) {
                break;
            }
        }
        Ok(())
    }

    /// Returns `false` when the shell should stop reading further lines.
    fn dispatch(&mut self, line: &str) -> bool {
        if line.is_empty() || line.starts_with('#') {
            return true;
        }
        let result = if line.starts_with('.') {
            self.process_dot_command(line)
        } else {
            self.execute_line(line).map(|_| true)
        };
        match result {
            Ok(keep_going) => keep_going,
            Err(_) => !self.bail,
        }
    }
}

impl Drop for Shell {
    fn drop(&mut self) {
        let _ = self.engine.checkpoint();
    }
}

fn type_oid_of(name: &str) -> Result<Oid, String> {
    match name {
        "integer" | "int" => Ok(TYPE_INTEGER),
        "bigint" | "int8" => Ok(TYPE_BIGINT),
        "real" | "float4" => Ok(TYPE_REAL),
        "double" | "float8" => Ok(TYPE_DOUBLE),
        "boolean" | "bool" => Ok(TYPE_BOOLEAN),
        "char" => Ok(TYPE_CHAR),
        "varchar" => Ok(TYPE_VARCHAR),
        "text" => Ok(TYPE_TEXT),
        other => Err(format!("unknown column type: {}", other)),
    }
}

fn type_name(oid: Oid) -> &'static str {
    match oid {
        t if t == TYPE_INTEGER => "integer",
        t if t == TYPE_BIGINT => "bigint",
        t if t == TYPE_REAL => "real",
        t if t == TYPE_DOUBLE => "double",
        t if t == TYPE_BOOLEAN => "boolean",
        t if t == TYPE_CHAR => "char",
        t if t == TYPE_VARCHAR => "varchar",
        t if t == TYPE_TEXT => "text",
        _ => "unknown",
    }
}

fn parse_value(text: &str, type_oid: Oid) -> Result<Value, String> {
    if text == "null" {
        return Ok(Value::Null);
    }
    match type_oid {
        t if t == TYPE_INTEGER => text.parse().map(Value::Integer).map_err(|_| format!("bad integer: {}", text)),
        t if t == TYPE_BIGINT => text.parse().map(Value::Bigint).map_err(|_| format!("bad bigint: {}", text)),
        t if t == TYPE_REAL => text.parse().map(Value::Real).map_err(|_| format!("bad real: {}", text)),
        t if t == TYPE_DOUBLE => text.parse().map(Value::Double).map_err(|_| format!("bad double: {}", text)),
        t if t == TYPE_BOOLEAN => match text {
            "true" | "1" => Ok(Value::Boolean(true)),
            "false" | "0" => Ok(Value::Boolean(false)),
            _ => Err(format!("bad boolean: {}", text)),
        },
        t if t == TYPE_CHAR => text.bytes().next().map(Value::Char).ok_or_else(|| "empty char".to_string()),
        t if t == TYPE_VARCHAR => Ok(Value::Varchar(text.to_string())),
        t if t == TYPE_TEXT => Ok(Value::Text(text.to_string())),
        _ => Err(format!("unknown column type oid {}", type_oid)),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(v) => v.to_string(),
        Value::Bigint(v) => v.to_string(),
        Value::Real(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Boolean(v) => v.to_string(),
        Value::Char(v) => (*v as char).to_string(),
        Value::Varchar(s) | Value::Text(s) => s.clone(),
    }
}

fn parse_xid(words: &[&str]) -> Result<Xid, String> {
    words.get(1).ok_or_else(|| "expected an xid".to_string())?.parse().map_err(|_| "bad xid".to_string())
}

fn print_help() {
    println!(
        r#".bail ON|OFF            Stop reading further lines after an error
.checkpoint             Flush the buffer pool and the WAL
.databases              Show the data directory in use
.echo ON|OFF            Echo each line before running it
.exit, .quit            Leave the shell
.help                   Show this message
.schema ?TABLE?         Show column definitions
.tables                 List table names
.version                Show version

begin                               Start a transaction, prints its xid
commit XID                          Commit a transaction
abort XID                           Abort a transaction, running its undo chain
create table NAME col:type[:notnull] ...
create index NAME ON TABLE column_index
insert XID TABLE value ...
select TABLE
delete XID TABLE page slot"#
    );
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let mut data_dir = "andb-data".to_string();
    for arg in &args[1..] {
        if !arg.starts_with('-') {
            data_dir = arg.clone();
        }
    }

    let mut shell = match Shell::new(&data_dir) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: unable to open {}: {}", data_dir, e);
            std::process::exit(1);
        }
    };

    let is_tty = io::stdin().is_terminal();
    let result = if is_tty { shell.run_interactive() } else { shell.run_stdin() };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
