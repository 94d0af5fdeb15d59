use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use client_core::{
    ApiClient, ClientError, ControllerOptions, FetchOutcome, PageSizePolicy,
    ResourceListController, SessionStore,
};
use shared::{
    domain::{IncidentKey, InstanceState, ProcessDefinitionKey, ProcessInstance, ProcessInstanceKey},
    protocol::{FilterField, ResourceFilter, ResultPage},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, parse_page_size, remove_token_file, resolve_token, write_token_file};

const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Parser, Debug)]
#[command(name = "operate-console", about = "Process-engine administration console")]
struct Cli {
    /// Backend base URL, e.g. http://localhost:8080/v1
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[arg(long, global = true)]
    token: Option<String>,
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    Whoami,
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Dashboard,
    Resources(ResourceArgs),
    BpmnXml {
        #[arg(long)]
        definition_key: ProcessDefinitionKey,
    },
    ResolveIncident {
        #[arg(long)]
        incident_key: IncidentKey,
    },
    Cancel {
        #[arg(long)]
        instance_key: ProcessInstanceKey,
    },
}

#[derive(Args, Debug)]
struct ResourceArgs {
    #[arg(long, value_parser = parse_page_size)]
    size: Option<std::num::NonZeroU32>,
    #[arg(long)]
    state: Option<InstanceState>,
    #[arg(long)]
    bpmn_process_id: Option<String>,
    #[arg(long)]
    start_date: Option<String>,
    #[arg(long)]
    end_date: Option<String>,
    #[arg(long)]
    process_definition_key: Option<String>,
    #[arg(long)]
    parent_process_instance_key: Option<String>,
    /// Number of pages to walk forward.
    #[arg(long, default_value_t = 1)]
    pages: usize,
}

impl ResourceArgs {
    fn filter(&self) -> Result<ResourceFilter> {
        let mut filter = ResourceFilter {
            state: self.state,
            ..ResourceFilter::default()
        };
        let text_fields = [
            (FilterField::BpmnProcessId, &self.bpmn_process_id),
            (FilterField::StartDate, &self.start_date),
            (FilterField::EndDate, &self.end_date),
            (FilterField::ProcessDefinitionKey, &self.process_definition_key),
            (
                FilterField::ParentProcessInstanceKey,
                &self.parent_process_instance_key,
            ),
        ];
        for (field, value) in text_fields {
            if let Some(value) = value {
                filter
                    .set(field, value)
                    .with_context(|| format!("invalid value for {field}"))?;
            }
        }
        Ok(filter)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(api_url) = cli.api_url {
        settings.api_url = api_url;
    }
    if let Some(token) = cli.token {
        settings.token = Some(token);
    }

    let session = Arc::new(match resolve_token(&settings)? {
        Some(token) => SessionStore::with_token(token),
        None => SessionStore::new(),
    });
    let api = Arc::new(
        ApiClient::new(settings.api_client_config(), session)
            .context("failed to create api client")?,
    );

    let result = run(cli.command, &settings, &api).await;
    if let Err(err) = &result {
        let session_lost = err
            .downcast_ref::<ClientError>()
            .is_some_and(ClientError::requires_reauth);
        if session_lost {
            if let Some(path) = &settings.token_file {
                warn!(path = %path.display(), "session expired; removing stored token");
                remove_token_file(path)?;
            }
        }
    }
    result
}

async fn run(command: Command, settings: &config::Settings, api: &Arc<ApiClient>) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let login = api.login(&email, &password).await?;
            if let Some(path) = &settings.token_file {
                write_token_file(path, &login.token)?;
                info!(path = %path.display(), "token stored");
            }
            println!("Signed in as {} <{}>", login.user.name, login.user.email);
        }
        Command::Logout => {
            api.session().clear();
            if let Some(path) = &settings.token_file {
                remove_token_file(path)?;
            }
            println!("Signed out");
        }
        Command::Whoami => {
            let user = api.current_user().await?;
            println!("{} <{}> (id {})", user.name, user.email, user.id);
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            api.register_user(&username, &email, &password).await?;
            println!("Registered {username}; check {email} to activate the account");
        }
        Command::Dashboard => {
            let summary = api.fetch_dashboard().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Resources(args) => list_resources(args, settings, api).await?,
        Command::BpmnXml { definition_key } => {
            println!("{}", api.fetch_bpmn_xml(definition_key).await?);
        }
        Command::ResolveIncident { incident_key } => {
            api.resolve_incident(incident_key).await?;
            println!("Incident {incident_key} resolved");
        }
        Command::Cancel { instance_key } => {
            api.cancel_process_instance(instance_key).await?;
            println!("Process instance {instance_key} canceled");
        }
    }
    Ok(())
}

async fn list_resources(
    args: ResourceArgs,
    settings: &config::Settings,
    api: &Arc<ApiClient>,
) -> Result<()> {
    let controller = ResourceListController::new(
        api.clone(),
        ControllerOptions {
            page_size: args.size.unwrap_or(settings.page_size),
            page_size_policy: PageSizePolicy::RestartFromFirstPage,
        },
    );

    let mut outcome = controller.apply_filter(args.filter()?).await?;
    for page_number in 1..=args.pages.max(1) {
        let FetchOutcome::Applied(page) = &outcome else {
            break;
        };
        print_page(page_number, page);
        if page_number == args.pages.max(1) || page.items.is_empty() {
            break;
        }
        outcome = controller.go_to_next_page().await?;
    }
    Ok(())
}

fn print_page(page_number: usize, page: &ResultPage) {
    println!(
        "page {page_number}: {} of {} instances",
        page.items.len(),
        page.total
    );
    for instance in &page.items {
        println!("{}", format_instance_row(instance));
    }
}

fn format_instance_row(instance: &ProcessInstance) -> String {
    let timestamp = |ts: Option<DateTime<Utc>>| {
        ts.map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    format!(
        "{:<20} {:<32} v{:<4} {:<10} {:<8} {:<19} {}",
        instance.key,
        instance.bpmn_process_id,
        instance.process_version,
        instance.state,
        if instance.incident { "incident" } else { "-" },
        timestamp(instance.start_date),
        timestamp(instance.end_date),
    )
}
