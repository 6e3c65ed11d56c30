use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use eruo::config::{AppConfig, save_app_config};
use eruo::database::{Connection, ConnectionKind, DbClient};
use eruo::formula::Formula;
use eruo::io::{self, read_workbook, workbook::read_workbook_schema, write_workbook};
use eruo::pipeline::executor::apply_step;
use eruo::pipeline::{PipelineSpec, Step, run_pipeline, validate_pipeline};
use eruo::search::{self, SearchOptions};
use eruo::sheet::{SheetDocument, index_to_name};
use eruo::sql::SqlWorkspace;
use eruo::workspace::Workspace;
use polars::prelude::*;
use secrecy::SecretString;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "eruo", version, about = "Sheets, formulas and pipelines for tabular files")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the schema, height and first rows of a file
    Inspect {
        file: PathBuf,

        /// Number of rows to preview. Defaults to the configured preview limit.
        #[arg(short = 'n', long)]
        rows: Option<usize>,
    },
    /// Evaluate a formula such as `Total = SUM([Sales])` or `= [A] * 2`
    Eval {
        file: PathBuf,

        formula: String,

        /// Write the table with the measure column to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Convert a file between CSV, JSON and Parquet
    Convert { input: PathBuf, output: PathBuf },
    /// Run SQL over files, each registered under its file stem
    Sql {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Query. Without FROM it reads the first file, also known as `self`.
        #[arg(short, long)]
        query: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Find text in the text columns of a file, optionally replacing it
    Find {
        file: PathBuf,

        text: String,

        /// Replace every match with this text
        #[arg(long)]
        replace: Option<String>,

        #[arg(long)]
        match_case: bool,

        /// Only match cells equal to the text
        #[arg(long)]
        match_cell: bool,

        /// Treat the text as a regular expression
        #[arg(long)]
        regex: bool,

        /// Where to write the replaced table. Defaults to the input file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Apply a text operator such as `uppercase` or `snake-case` to columns
    Transform {
        file: PathBuf,

        operator: String,

        #[arg(short, long, num_args = 1.., required = true)]
        columns: Vec<String>,

        /// Operator argument, repeatable
        #[arg(short, long = "arg")]
        args: Vec<String>,

        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate or run pipeline specs
    Pipeline {
        #[command(subcommand)]
        action: PipelineAction,
    },
    /// Pack files into a workbook or list its sheets
    Workbook {
        #[command(subcommand)]
        action: WorkbookAction,
    },
    /// Manage saved database connections
    Connections {
        #[command(subcommand)]
        action: ConnectionAction,
    },
}

#[derive(Subcommand)]
pub enum PipelineAction {
    /// Check a spec against the schema of an input file
    Validate { spec: PathBuf, input: PathBuf },
    /// Run a spec on an input file
    Run {
        spec: PathBuf,

        input: PathBuf,

        /// Overrides output.path_template of the spec
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum WorkbookAction {
    /// Open each file as a sheet and save them as one workbook
    Pack {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,
    },
    /// List the sheets of a workbook
    List { book: PathBuf },
}

#[derive(Subcommand)]
pub enum ConnectionAction {
    /// List saved connections
    List,
    /// Save a connection
    Add {
        name: String,

        /// sqlite, mysql or postgresql
        #[arg(long, default_value = "sqlite")]
        kind: String,

        /// Database file for SQLite
        #[arg(long, default_value = "")]
        path: String,

        #[arg(long, default_value = "")]
        host: String,

        #[arg(long)]
        port: Option<u16>,

        #[arg(long, default_value = "")]
        user: String,

        #[arg(long, default_value = "")]
        database: String,
    },
    /// Rename a saved connection
    Rename { old: String, new: String },
    /// Remove a saved connection
    Remove { name: String },
    /// List the tables of a database
    Tables {
        name: String,

        #[arg(long, env = "ERUO_DB_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Run a query against a database
    Query {
        name: String,

        #[arg(short, long)]
        query: String,

        #[arg(long, env = "ERUO_DB_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub async fn run_command(command: Commands, config: &mut AppConfig) -> Result<()> {
    match command {
        Commands::Inspect { file, rows } => handle_inspect(&file, rows, config),
        Commands::Eval {
            file,
            formula,
            output,
        } => handle_eval(&file, &formula, output.as_deref(), config),
        Commands::Convert { input, output } => handle_convert(&input, &output, config),
        Commands::Sql {
            files,
            query,
            output,
        } => handle_sql(&files, &query, output.as_deref(), config),
        Commands::Find {
            file,
            text,
            replace,
            match_case,
            match_cell,
            regex,
            output,
        } => {
            let options = SearchOptions {
                match_case,
                match_cell,
                use_regexp: regex,
                within: None,
            };
            handle_find(&file, &text, replace.as_deref(), &options, output.as_deref(), config)
        }
        Commands::Transform {
            file,
            operator,
            columns,
            args,
            output,
        } => handle_transform(&file, operator, columns, args, &output, config),
        Commands::Pipeline { action } => handle_pipeline(action, config),
        Commands::Workbook { action } => handle_workbook(action, config),
        Commands::Connections { action } => handle_connections(action, config).await,
    }?;
    save_app_config(config)
}

fn read_input(path: &Path, config: &mut AppConfig) -> Result<DataFrame> {
    let df = io::read_file_with(path, config.settings().csv_fallback)?;
    config.settings_mut().push_recent_file(path);
    Ok(df)
}

fn write_output(df: &mut DataFrame, path: &Path, config: &AppConfig) -> Result<()> {
    io::write_file_with(df, path, config.settings().keep_backups)
}

fn preview(df: &DataFrame, config: &AppConfig) {
    println!("{}", df.head(Some(config.settings().preview_row_limit)));
}

fn handle_inspect(file: &Path, rows: Option<usize>, config: &mut AppConfig) -> Result<()> {
    let df = read_input(file, config)?;
    println!("{}: {} rows × {} columns", file.display(), df.height(), df.width());
    for (name, dtype) in df.schema().iter() {
        println!("  {name}: {}", eruo::sheet::long_name(dtype));
    }
    let limit = rows.unwrap_or(config.settings().preview_row_limit);
    println!("{}", df.head(Some(limit)));
    config.log_event("Inspect", file.display().to_string());
    Ok(())
}

fn handle_eval(
    file: &Path,
    formula: &str,
    output: Option<&Path>,
    config: &mut AppConfig,
) -> Result<()> {
    let df = read_input(file, config)?;
    let formula = Formula::parse(formula, config.settings().list_separator.as_char())?;

    if formula.parsed.measure.is_some() {
        let mut out = formula.evaluate(&df)?;
        match output {
            Some(path) => {
                write_output(&mut out, path, config)?;
                println!("Wrote {} rows to {}", out.height(), path.display());
            }
            None => preview(&out, config),
        }
    } else {
        let column = formula.evaluate_standalone(&df)?;
        if column.len() == 1 {
            println!("{}", column.get(0)?.str_value());
        } else {
            preview(&DataFrame::new(vec![column])?, config);
        }
    }
    config.log_event("Evaluate formula", formula.output_name().to_owned());
    Ok(())
}

fn handle_convert(input: &Path, output: &Path, config: &mut AppConfig) -> Result<()> {
    let mut df = read_input(input, config)?;
    write_output(&mut df, output, config)?;
    println!(
        "Converted {} to {} ({} rows)",
        input.display(),
        output.display(),
        df.height()
    );
    config.log_event("Convert", format!("{} → {}", input.display(), output.display()));
    Ok(())
}

fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .with_context(|| format!("Invalid file name: {}", path.display()))
}

fn handle_sql(
    files: &[PathBuf],
    query: &str,
    output: Option<&Path>,
    config: &mut AppConfig,
) -> Result<()> {
    let mut workspace = Workspace::with_settings(config.settings());
    for file in files {
        let df = read_input(file, config)?;
        workspace.create_sheet(df, Some(&file_stem(file)?));
    }

    let mut sql = SqlWorkspace::from_workspace(&workspace);
    if let Some(main) = workspace.sheets().first().and_then(SheetDocument::main) {
        sql.register_self(main);
    }
    let mut result = sql.execute(query)?;
    match output {
        Some(path) => {
            write_output(&mut result, path, config)?;
            println!("Wrote {} rows to {}", result.height(), path.display());
        }
        None => preview(&result, config),
    }
    config.log_event("SQL", query.to_owned());
    Ok(())
}

fn handle_find(
    file: &Path,
    text: &str,
    replace: Option<&str>,
    options: &SearchOptions,
    output: Option<&Path>,
    config: &mut AppConfig,
) -> Result<()> {
    let df = read_input(file, config)?;
    let title = file_stem(file)?;
    let mut doc = SheetDocument::new(title, df).with_separator(config.settings().list_separator);

    let Some(replace) = replace else {
        let results = search::find(&doc, text, options)?;
        println!("{} matches", results.count);
        for (column, row) in results.cells {
            println!("  {}", index_to_name(column, row));
        }
        config.log_event("Find", text.to_owned());
        return Ok(());
    };

    let count = search::replace_all(&mut doc, text, replace, options)?;
    println!("Replaced {count} cells");
    if count > 0 {
        let path = output.unwrap_or(file);
        let Some(main) = doc.main() else {
            bail!("Sheet has no table");
        };
        write_output(&mut main.clone(), path, config)?;
        println!("Wrote {}", path.display());
    }
    config.log_event("Replace", format!("{text} → {replace} ({count} cells)"));
    Ok(())
}

fn handle_transform(
    file: &Path,
    operator: String,
    columns: Vec<String>,
    args: Vec<String>,
    output: &Path,
    config: &mut AppConfig,
) -> Result<()> {
    let df = read_input(file, config)?;
    config.log_event("Transform", operator.clone());
    let step = Step::TextTransform {
        columns,
        operator,
        args,
    };
    let mut out = apply_step(&step, df.lazy(), config.settings().list_separator)?.collect()?;
    write_output(&mut out, output, config)?;
    println!("Wrote {} rows to {}", out.height(), output.display());
    Ok(())
}

fn handle_pipeline(action: PipelineAction, config: &mut AppConfig) -> Result<()> {
    match action {
        PipelineAction::Validate { spec, input } => {
            let pipeline = PipelineSpec::from_file(&spec)?;
            let mut lf = eruo::pipeline::executor::load_input(&input, &pipeline.input)?;
            let schema = lf.collect_schema()?;
            let errors = validate_pipeline(&pipeline, &schema)?;
            if errors.is_empty() {
                println!("Pipeline '{}' is valid ({} steps)", pipeline.name, pipeline.steps.len());
            } else {
                for error in &errors {
                    println!("{error}");
                }
                bail!("Pipeline validation failed with {} errors", errors.len());
            }
            config.log_event("Validate pipeline", spec.display().to_string());
        }
        PipelineAction::Run {
            spec,
            input,
            output,
        } => {
            let pipeline = PipelineSpec::from_file(&spec)?;
            let report = run_pipeline(&pipeline, &input, output.as_deref())?;
            for warning in &report.warnings {
                println!("warning: {warning}");
            }
            println!("{}", report.summary());
            println!("Output: {}", report.output_path.display());
            config.log_event("Run pipeline", report.summary());
        }
    }
    Ok(())
}

fn handle_workbook(action: WorkbookAction, config: &mut AppConfig) -> Result<()> {
    match action {
        WorkbookAction::Pack { files, output } => {
            let mut workspace = Workspace::with_settings(config.settings());
            for file in &files {
                let df = read_input(file, config)?;
                workspace.create_sheet(df, Some(&file_stem(file)?));
            }
            write_workbook(&workspace, &output)?;
            println!("Packed {} sheets into {}", workspace.len(), output.display());
            config.log_event("Pack workbook", output.display().to_string());
        }
        WorkbookAction::List { book } => {
            let schema = read_workbook_schema(&book)?;
            let workspace = read_workbook(&book)?;
            for (index, sheet) in workspace.sheets().iter().enumerate() {
                let marker = if index == schema.current_active_tab { "*" } else { " " };
                let shape = sheet
                    .main()
                    .map(|df| format!("{} × {}", df.height(), df.width()))
                    .unwrap_or_else(|| "empty".to_owned());
                println!(
                    "{marker} {} ({shape}, {} tables)",
                    sheet.title(),
                    sheet.data().len()
                );
            }
            config.settings_mut().push_recent_file(&book);
        }
    }
    Ok(())
}

async fn handle_connections(action: ConnectionAction, config: &mut AppConfig) -> Result<()> {
    match action {
        ConnectionAction::List => {
            if config.connections().is_empty() {
                println!("No saved connections");
            }
            for connection in config.connections().iter() {
                println!("{} ({}): {}", connection.name, connection.kind, connection.url(None));
            }
        }
        ConnectionAction::Add {
            name,
            kind,
            path,
            host,
            port,
            user,
            database,
        } => {
            let kind: ConnectionKind = kind.parse()?;
            let connection = if kind == ConnectionKind::Sqlite {
                if path.is_empty() {
                    bail!("SQLite connections need --path");
                }
                Connection::sqlite(name, path)
            } else {
                Connection::server(kind, name, host, port, user, database)
            };
            let stored = config.connections_mut().add(connection);
            println!("Saved connection '{stored}'");
            config.log_event("Add connection", stored);
        }
        ConnectionAction::Rename { old, new } => {
            config.connections_mut().rename(&old, &new)?;
            println!("Renamed '{old}' to '{new}'");
            config.log_event("Rename connection", format!("{old} → {new}"));
        }
        ConnectionAction::Remove { name } => {
            if !config.connections_mut().remove(&name) {
                bail!("Unknown connection: {name}");
            }
            println!("Removed '{name}'");
            config.log_event("Remove connection", name);
        }
        ConnectionAction::Tables { name, password } => {
            let client = connect(config, &name, password).await?;
            for table in client.list_tables().await? {
                println!("{table}");
            }
            client.close().await;
        }
        ConnectionAction::Query {
            name,
            query,
            password,
            output,
        } => {
            let client = connect(config, &name, password).await?;
            let mut df = client.query(&query).await?;
            client.close().await;
            match output {
                Some(path) => {
                    write_output(&mut df, &path, config)?;
                    println!("Wrote {} rows to {}", df.height(), path.display());
                }
                None => preview(&df, config),
            }
            config.log_event("Database query", format!("{name}: {query}"));
        }
    }
    Ok(())
}

async fn connect(config: &AppConfig, name: &str, password: Option<String>) -> Result<DbClient> {
    let connection = config
        .connections()
        .get(name)
        .with_context(|| format!("Unknown connection: {name}"))?;
    let password = password.map(SecretString::from);
    Ok(DbClient::connect(&connection.url(password.as_ref())).await?)
}
