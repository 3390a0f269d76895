use std::time::Duration;

use clap::Parser;

use basalt::morsel::Datum;

/// Basalt - SQL queries over columnar datasets on blob storage
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The SQL statement to execute
    sql: String,

    /// Positional parameter values substituted for `?` placeholders
    #[arg(long = "param")]
    params: Vec<String>,

    /// Output format
    #[arg(long, default_value = "table", value_parser = ["table", "json"])]
    format: String,

    /// Print execution statistics after the result
    #[arg(long)]
    stats: bool,

    /// Query deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

/// CLI parameters arrive as text; take the narrowest literal reading.
fn parse_param(raw: &str) -> Datum {
    if raw.eq_ignore_ascii_case("null") {
        return Datum::Null;
    }
    if raw.eq_ignore_ascii_case("true") {
        return Datum::Boolean(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Datum::Boolean(false);
    }
    if let Ok(integer) = raw.parse::<i64>() {
        return Datum::Integer(integer);
    }
    if let Ok(double) = raw.parse::<f64>() {
        return Datum::Double(double);
    }
    Datum::Varchar(raw.to_string())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let params: Vec<Datum> = cli.params.iter().map(|p| parse_param(p)).collect();

    let connection = match basalt::connect() {
        Ok(connection) => connection,
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(error.exit_code());
        }
    };

    let mut cursor = connection.cursor();
    if let Some(timeout_ms) = cli.timeout_ms {
        cursor = cursor.with_deadline(Duration::from_millis(timeout_ms));
    }

    if let Err(error) = cursor.execute(&cli.sql, &params) {
        eprintln!("{error}");
        std::process::exit(error.exit_code());
    }

    match cursor.fetch_all() {
        Ok(result) => match cli.format.as_str() {
            "json" => println!("{}", result.to_json_rows()),
            _ => print!("{result}"),
        },
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(error.exit_code());
        }
    }

    if cli.stats {
        for (counter, value) in cursor.stats() {
            eprintln!("{counter}: {value}");
        }
        for message in cursor.messages() {
            eprintln!("message: {message}");
        }
    }
}
