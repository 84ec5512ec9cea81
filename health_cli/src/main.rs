use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use health_core::marshal::{format_date, parse_date};
use health_core::registry::{self, Registry, RegistryEntry};
use health_core::*;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "hkq")]
#[command(about = "Query and record health data through a typed health client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Fixture document backing the simulated health service
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    /// Reject explicit units outside the identifier's unit family
    #[arg(long, global = true)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List known identifiers
    Identifiers {
        #[arg(long, value_enum)]
        kind: Option<Kind>,
    },

    /// Show the registry entry for an identifier
    Inspect { identifier: String },

    /// Most recent samples of a quantity or category type
    Last {
        identifier: String,

        #[arg(long)]
        limit: Option<u32>,

        /// Unit to report quantities in (default: the preferred unit)
        #[arg(long)]
        unit: Option<String>,
    },

    /// Samples that lie inside a date range
    Between {
        identifier: String,

        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        #[arg(long)]
        unit: Option<String>,
    },

    /// Aggregate a quantity type over a date range
    Stats {
        identifier: String,

        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        /// Statistics to compute (e.g. cumulativeSum, discreteAverage, mostRecent)
        #[arg(long = "option")]
        options: Vec<String>,

        #[arg(long)]
        unit: Option<String>,
    },

    /// Record a sample
    Save {
        identifier: String,

        /// Numeric quantity, or a category value code or name
        value: String,

        #[arg(long)]
        unit: Option<String>,

        #[arg(long)]
        start: Option<String>,

        /// Defaults to the start date
        #[arg(long)]
        end: Option<String>,
    },

    /// Whether sharing a type has been authorized
    AuthStatus { identifier: String },

    /// Request read and write access
    RequestAuth {
        #[arg(long, num_args = 1..)]
        read: Vec<String>,

        #[arg(long, num_args = 1..)]
        write: Vec<String>,
    },

    /// Show the user's characteristics
    Characteristics,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Kind {
    Quantity,
    Category,
    Correlation,
    Workout,
    Characteristic,
}

/// Value supplied to `save`, checked against the identifier's kind
enum SaveValue {
    Quantity(f64),
    Category(i32),
}

/// A command with every identifier, unit and date already parsed
enum Action {
    Identifiers(Option<Kind>),
    Inspect(RegistryEntry),
    Query {
        identifier: SampleIdentifier,
        options: QueryOptions,
    },
    Stats {
        identifier: QuantityTypeIdentifier,
        options: Vec<StatisticsOption>,
        range: DateInterval,
        unit: UnitRequest,
    },
    Save {
        identifier: SampleIdentifier,
        value: SaveValue,
        unit: Option<Unit>,
        interval: DateInterval,
    },
    AuthStatus(PermissionIdentifier),
    RequestAuth {
        read: Vec<PermissionIdentifier>,
        write: Vec<PermissionIdentifier>,
    },
    Characteristics,
}

impl Action {
    /// Whether the command needs the fixture-backed service
    fn needs_service(&self) -> bool {
        !matches!(self, Action::Identifiers(_) | Action::Inspect(_))
    }

    /// Whether the command changes the fixture
    fn mutates(&self) -> bool {
        matches!(self, Action::Save { .. } | Action::RequestAuth { .. })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    health_core::logging::init();

    let cli = Cli::parse();

    // Identifiers are validated before any file is read
    let action = plan(cli.command)?;

    if !action.needs_service() {
        return run_offline(action);
    }

    let mut config = Config::load()?;
    if cli.strict {
        config.units.strict = true;
    }
    let fixture_path = cli.fixture.unwrap_or_else(|| config.fixture.path.clone());

    tracing::debug!("Using fixture {:?}", fixture_path);
    let fixture = Fixture::load(&fixture_path)?;
    let bridge = Arc::new(MemoryBridge::from_fixture(fixture, config.events.buffer_size));
    let mutates = action.mutates();
    let client = HealthClient::new(Arc::clone(&bridge), config);

    run(&client, action).await?;

    if mutates {
        bridge.snapshot().save(&fixture_path)?;
        tracing::info!("Updated fixture {:?}", fixture_path);
    }
    Ok(())
}

fn plan(command: Commands) -> Result<Action> {
    let action = match command {
        Commands::Identifiers { kind } => Action::Identifiers(kind),
        Commands::Inspect { identifier } => Action::Inspect(Registry::global().lookup(&identifier)?),
        Commands::Last {
            identifier,
            limit,
            unit,
        } => Action::Query {
            identifier: identifier.parse()?,
            options: QueryOptions {
                limit,
                unit: unit_request(unit),
                ..QueryOptions::default()
            },
        },
        Commands::Between {
            identifier,
            from,
            to,
            unit,
        } => {
            let identifier = identifier.parse()?;
            let range = interval(&from, &to)?;
            Action::Query {
                identifier,
                options: QueryOptions::between(range.from, range.to).with_unit(unit_request(unit)),
            }
        }
        Commands::Stats {
            identifier,
            from,
            to,
            options,
            unit,
        } => {
            let identifier: QuantityTypeIdentifier = identifier.parse()?;
            let options = if options.is_empty() {
                default_statistics(identifier)
            } else {
                options
                    .iter()
                    .map(|o| o.parse())
                    .collect::<Result<Vec<StatisticsOption>>>()?
            };
            Action::Stats {
                identifier,
                options,
                range: interval(&from, &to)?,
                unit: unit_request(unit),
            }
        }
        Commands::Save {
            identifier,
            value,
            unit,
            start,
            end,
        } => {
            let identifier: SampleIdentifier = identifier.parse()?;
            let value = parse_save_value(identifier, &value)?;
            let start = match start {
                Some(start) => parse_date(&start)?,
                None => Utc::now(),
            };
            let end = match end {
                Some(end) => parse_date(&end)?,
                None => start,
            };
            Action::Save {
                identifier,
                value,
                unit: unit.map(|u| Unit::from(u.as_str())),
                interval: DateInterval::new(start, end)?,
            }
        }
        Commands::AuthStatus { identifier } => Action::AuthStatus(identifier.parse()?),
        Commands::RequestAuth { read, write } => Action::RequestAuth {
            read: parse_permissions(&read)?,
            write: parse_permissions(&write)?,
        },
        Commands::Characteristics => Action::Characteristics,
    };
    Ok(action)
}

fn unit_request(unit: Option<String>) -> UnitRequest {
    unit.map(|u| Unit::from(u.as_str())).into()
}

fn interval(from: &str, to: &str) -> Result<DateInterval> {
    DateInterval::new(parse_date(from)?, parse_date(to)?)
}

fn parse_permissions(names: &[String]) -> Result<Vec<PermissionIdentifier>> {
    names.iter().map(|name| name.parse()).collect()
}

fn parse_save_value(identifier: SampleIdentifier, value: &str) -> Result<SaveValue> {
    let unexpected = || Error::UnexpectedValue {
        field: identifier.to_string(),
        value: value.to_string(),
    };
    match identifier {
        SampleIdentifier::Quantity(_) => value.parse().map(SaveValue::Quantity).map_err(|_| unexpected()),
        SampleIdentifier::Category(id) => {
            let values = registry::category_entry(id).values;
            value
                .parse()
                .ok()
                .or_else(|| values.code_of(value))
                .map(SaveValue::Category)
                .ok_or_else(unexpected)
        }
    }
}

fn default_statistics(identifier: QuantityTypeIdentifier) -> Vec<StatisticsOption> {
    if registry::quantity_entry(identifier).cumulative {
        vec![StatisticsOption::CumulativeSum, StatisticsOption::MostRecent]
    } else {
        vec![
            StatisticsOption::DiscreteAverage,
            StatisticsOption::DiscreteMin,
            StatisticsOption::DiscreteMax,
            StatisticsOption::MostRecent,
        ]
    }
}

fn run_offline(action: Action) -> Result<()> {
    match action {
        Action::Identifiers(kind) => cmd_identifiers(kind),
        Action::Inspect(entry) => {
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        _ => return Err(Error::Other("command needs the health service".into())),
    }
    Ok(())
}

fn cmd_identifiers(kind: Option<Kind>) {
    let wants = |k: Kind| kind.map_or(true, |kind| kind == k);
    let registry = Registry::global();

    if wants(Kind::Quantity) {
        for entry in &registry.quantities {
            println!("{:<50} {:?}", entry.identifier.as_wire(), entry.unit_family);
        }
    }
    if wants(Kind::Category) {
        for entry in &registry.categories {
            println!("{}", entry.identifier);
        }
    }
    if wants(Kind::Correlation) {
        for entry in &registry.correlations {
            println!("{}", entry.identifier);
        }
    }
    if wants(Kind::Workout) {
        for entry in &registry.workouts {
            println!("{:<50} {}", entry.activity.name(), entry.activity.raw_value());
        }
    }
    if wants(Kind::Characteristic) {
        for id in CharacteristicTypeIdentifier::ALL {
            println!("{}", id);
        }
    }
}

async fn run(client: &HealthClient<MemoryBridge>, action: Action) -> Result<()> {
    match action {
        Action::Query {
            identifier,
            options,
        } => cmd_query(client, identifier, options).await,
        Action::Stats {
            identifier,
            options,
            range,
            unit,
        } => {
            let stats = client
                .query_statistics(identifier, &options, range.from, range.to, unit)
                .await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Action::Save {
            identifier,
            value,
            unit,
            interval,
        } => cmd_save(client, identifier, value, unit, interval).await,
        Action::AuthStatus(identifier) => {
            let authorized = client.authorization_status(identifier).await?;
            println!(
                "{}: {}",
                identifier,
                if authorized { "authorized" } else { "not authorized" }
            );
            Ok(())
        }
        Action::RequestAuth { read, write } => {
            let granted = client.request_authorization(&read, &write).await?;
            println!("Authorization request {}", if granted { "granted" } else { "declined" });
            Ok(())
        }
        Action::Characteristics => cmd_characteristics(client).await,
        offline => run_offline(offline),
    }
}

async fn cmd_query(
    client: &HealthClient<MemoryBridge>,
    identifier: SampleIdentifier,
    options: QueryOptions,
) -> Result<()> {
    match identifier {
        SampleIdentifier::Quantity(id) => {
            let samples = client.query_quantity_samples(id, options).await?;
            if samples.is_empty() {
                println!("No {} samples.", id.short_name());
            }
            for sample in samples {
                println!(
                    "{} .. {}  {} {}",
                    format_date(&sample.start_date),
                    format_date(&sample.end_date),
                    sample.quantity,
                    sample.unit
                );
            }
        }
        SampleIdentifier::Category(id) => {
            let samples = client.query_category_samples(id, options).await?;
            if samples.is_empty() {
                println!("No {} samples.", id.short_name());
            }
            for sample in samples {
                let value = sample
                    .value_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| sample.value.to_string());
                println!(
                    "{} .. {}  {}",
                    format_date(&sample.start_date),
                    format_date(&sample.end_date),
                    value
                );
            }
        }
    }
    Ok(())
}

async fn cmd_save(
    client: &HealthClient<MemoryBridge>,
    identifier: SampleIdentifier,
    value: SaveValue,
    unit: Option<Unit>,
    interval: DateInterval,
) -> Result<()> {
    let metadata = Metadata::default();
    let saved = match (identifier, value) {
        (SampleIdentifier::Quantity(id), SaveValue::Quantity(quantity)) => {
            let unit = match unit {
                Some(unit) => unit,
                None => client.preferred_unit(id).await?,
            };
            client
                .save_quantity_sample(id, &unit, quantity, interval, &metadata)
                .await?
        }
        (SampleIdentifier::Category(id), SaveValue::Category(code)) => {
            client
                .save_category_sample(id, code, interval, &metadata)
                .await?
        }
        _ => return Err(Error::Other("value does not match identifier kind".into())),
    };

    if saved {
        println!("✓ Saved {}", identifier.short_name());
    } else {
        println!("Service did not save {}", identifier.short_name());
    }
    Ok(())
}

async fn cmd_characteristics(client: &HealthClient<MemoryBridge>) -> Result<()> {
    let date_of_birth: Option<DateTime<Utc>> = client.date_of_birth().await?;
    println!("biologicalSex:        {:?}", client.biological_sex().await?);
    println!("bloodType:            {:?}", client.blood_type().await?);
    println!(
        "dateOfBirth:          {}",
        date_of_birth.map_or_else(|| "not set".to_string(), |d| format_date(&d))
    );
    println!("fitzpatrickSkinType:  {:?}", client.fitzpatrick_skin_type().await?);
    println!("wheelchairUse:        {:?}", client.wheelchair_use().await?);
    Ok(())
}
