use anyhow::Context;
use api_rest::{config_from_env, load_services, AppState};
use clap::{Parser, Subcommand};
use emr_core::representation::Representation;
use emr_core::{schema, ResourceRegistry};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "emr")]
#[command(about = "EMR REST facade CLI")]
struct Cli {
    /// YAML seed for the in-memory store
    #[arg(long, global = true)]
    seed: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered resources with their versions and sub-resources
    Resources,
    /// Show the properties a resource exposes under a representation
    Describe {
        /// Resource name, e.g. patient
        resource: String,
        /// Representation: ref, default, full, a named one, or custom:(...)
        #[arg(short = 'v', long, default_value = "default")]
        rep: String,
    },
    /// Print the generated OpenAPI models as JSON
    Schema {
        /// Only the models of this resource
        resource: Option<String>,
    },
    /// Render one object from the seeded store
    Get {
        resource: String,
        /// Uuid, or a name where the resource allows it
        id: String,
        #[arg(short = 'v', long, default_value = "default")]
        rep: String,
    },
    /// List or search a resource in the seeded store
    List {
        resource: String,
        /// Request parameters as key=value, e.g. q=john limit=5
        params: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let registry = ResourceRegistry::standard();

    match cli.command {
        Some(Commands::Resources) => {
            for info in registry.resource_infos() {
                if info.sub_resources.is_empty() {
                    println!("{} (v{})", info.name, info.version);
                } else {
                    println!(
                        "{} (v{}) sub-resources: {}",
                        info.name,
                        info.version,
                        info.sub_resources.join(", ")
                    );
                }
            }
        }
        Some(Commands::Describe { resource, rep }) => {
            for line in describe(&registry, &resource, &rep)? {
                println!("{line}");
            }
        }
        Some(Commands::Schema { resource }) => {
            let prefix = resource.as_deref().map(|r| schema::model_name(r, ""));
            let models: serde_json::Map<String, serde_json::Value> = schema::models(&registry)
                .into_iter()
                .filter(|(name, _)| prefix.as_ref().map_or(true, |p| is_model_of(name, p)))
                .map(|(name, model)| -> anyhow::Result<(String, serde_json::Value)> {
                    Ok((name, serde_json::to_value(model)?))
                })
                .collect::<anyhow::Result<_>>()?;
            println!("{}", serde_json::to_string_pretty(&models)?);
        }
        Some(Commands::Get { resource, id, rep }) => {
            let state = state(cli.seed)?;
            let ctx = state
                .context(vec![("v".to_owned(), rep)])
                .map_err(|e| e.0)?;
            let found = state.registry.resource(&resource)?.retrieve(&id, &ctx)?;
            println!("{}", serde_json::to_string_pretty(&found)?);
        }
        Some(Commands::List { resource, params }) => {
            let state = state(cli.seed)?;
            let ctx = state.context(parse_params(&params)?).map_err(|e| e.0)?;
            let page = state.registry.resource(&resource)?.list(&ctx)?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        None => {
            println!("Use 'emr --help' for commands");
        }
    }

    Ok(())
}

fn state(seed: Option<PathBuf>) -> anyhow::Result<AppState> {
    let config = config_from_env()?;
    let services = load_services(seed.as_deref())?;
    Ok(AppState::new(services, config))
}

/// Model names are the resource name followed by a capitalised suffix (`PatientGetRef`).
fn is_model_of(model: &str, prefix: &str) -> bool {
    model
        .strip_prefix(prefix)
        .and_then(|rest| rest.chars().next())
        .is_some_and(char::is_uppercase)
}

fn parse_params(params: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    params
        .iter()
        .map(|param| -> anyhow::Result<(String, String)> {
            let (key, value) = param
                .split_once('=')
                .with_context(|| format!("parameter '{param}' is not key=value"))?;
            Ok((key.trim().to_owned(), value.trim().to_owned()))
        })
        .collect()
}

fn describe(registry: &ResourceRegistry, resource: &str, rep: &str) -> anyhow::Result<Vec<String>> {
    let converter = registry
        .converter(resource)
        .with_context(|| format!("unknown resource {resource}"))?;
    let rep = Representation::parse(rep);
    let description = converter
        .describe(&rep)
        .with_context(|| format!("{resource} has no {rep} representation"))?;

    let mut lines = vec![format!("{resource} v{} ({rep})", converter.version())];
    for property in description.properties() {
        let mut line = format!("  {}: {:?}", property.name, converter.type_of(&property.source));
        if let Some(nested) = &property.nested {
            line.push_str(&format!(" as {nested}"));
        }
        lines.push(line);
    }
    for link in description.links() {
        lines.push(format!("  link {} -> {}", link.rel, link.suffix));
    }
    if let Ok(creatable) = converter.creatable() {
        let fields: Vec<String> = creatable
            .fields()
            .iter()
            .map(|f| if f.required { format!("{}*", f.name) } else { f.name.clone() })
            .collect();
        lines.push(format!("  creatable: {}", fields.join(", ")));
    }
    Ok(lines)
}
