//! slotdb command line tool: convert delimited text files into heap files
//! and scan heap files back out as text.

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;

use slotdb::access::value::{Field, FieldType};
use slotdb::access::{Schema, Tuple};
use slotdb::database::Database;

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a delimited text file into a heap file
    Convert {
        /// Input text file, one row per line
        input: PathBuf,

        /// Comma-separated column types, e.g. "int,text,int"
        #[arg(short, long)]
        schema: String,

        /// Output heap file (defaults to the input with a .dat extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Field delimiter within a line
        #[arg(short = 'F', long, default_value = ",")]
        delimiter: String,
    },
    /// Print every tuple of a heap file
    Scan {
        /// Heap file to read
        file: PathBuf,

        /// Comma-separated column types, e.g. "int,text,int"
        #[arg(short, long)]
        schema: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match args.command {
        Command::Convert {
            input,
            schema,
            output,
            delimiter,
        } => convert(input, &schema, output, &delimiter),
        Command::Scan { file, schema } => scan(file, &schema),
    }
}

fn parse_schema(spec: &str) -> Result<Schema> {
    let mut types = Vec::new();
    for name in spec.split(',') {
        match name.trim() {
            "int" => types.push(FieldType::Int),
            "text" | "string" => types.push(FieldType::Text),
            other => bail!("unknown column type '{}' (expected int or text)", other),
        }
    }
    if types.is_empty() {
        bail!("schema must name at least one column");
    }
    Ok(Schema::from_types(&types))
}

fn parse_row(line: &str, schema: &Schema, delimiter: &str) -> Result<Tuple> {
    let parts: Vec<&str> = line.split(delimiter).collect();
    if parts.len() != schema.len() {
        bail!(
            "row has {} fields but the schema has {} columns: {}",
            parts.len(),
            schema.len(),
            line
        );
    }
    let mut fields = Vec::with_capacity(parts.len());
    for (part, column) in parts.iter().zip(schema.columns()) {
        let part = part.trim();
        match column.ty {
            FieldType::Int => fields.push(Field::Int(
                part.parse()
                    .with_context(|| format!("'{}' is not an integer", part))?,
            )),
            FieldType::Text => fields.push(Field::Text(part.to_string())),
        }
    }
    Ok(Tuple::new(fields))
}

fn convert(
    input: PathBuf,
    schema_spec: &str,
    output: Option<PathBuf>,
    delimiter: &str,
) -> Result<()> {
    let schema = parse_schema(schema_spec)?;
    let output = output.unwrap_or_else(|| input.with_extension("dat"));

    let reader = std::io::BufReader::new(
        std::fs::File::open(&input).with_context(|| format!("cannot open {:?}", input))?,
    );

    let db = Database::new();
    let table = db
        .create_table(&output, "convert", schema.clone())
        .with_context(|| format!("cannot create {:?}", output))?;

    let tid = db.begin();
    let mut rows = 0u64;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut tuple = parse_row(&line, &schema, delimiter)?;
        db.insert_tuple(tid, table, &mut tuple)
            .context("insert failed")?;
        rows += 1;
    }
    db.commit(tid).context("commit failed")?;

    let pages = db.catalog().file(table)?.page_count();
    println!("{:?}: {} rows in {} pages", output, rows, pages);
    Ok(())
}

fn scan(file: PathBuf, schema_spec: &str) -> Result<()> {
    let schema = parse_schema(schema_spec)?;

    let db = Database::new();
    let table = db
        .open_table(&file, "scan", schema)
        .with_context(|| format!("cannot open {:?}", file))?;

    let tid = db.begin();
    let mut scan = db.scan(tid, table)?;
    scan.open()?;
    let mut rows = 0u64;
    while let Some(tuple) = scan.next()? {
        println!("{}", tuple);
        rows += 1;
    }
    scan.close();
    db.commit(tid)?;

    log::info!("{} rows", rows);
    Ok(())
}
