use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde_json::Value;

use juviz::db::open::open_db;
use juviz::format::OutputFormat;
use juviz::job::JobId;
use juviz::panel::Panel;
use juviz::settings::{ConfigStore, SettingField, SettingsChange, SettingsRegistry, SettingsSchema};
use juviz::slurm::cli::Slurm;
use juviz::slurm::launcher::{poll_status, ParaViewServer, Scheduler, UserData};
use juviz::slurm::template::ScriptTemplate;
use juviz::trame::{discover_apps, find_app, InstanceParameters, LaunchOptions, TrameApp, TrameInstance};
use juviz::WorkingDirectory;

#[derive(Parser)]
#[command(name = "juviz", version, about = "Launch ParaView servers on a SLURM cluster and connect to them")]
struct Cli {
    /// Directory holding the settings database [default: $HOME/.juviz]
    #[arg(long, env = "JUVIZ_WORK_DIR", global = true)]
    work_dir: Option<PathBuf>,

    /// Directory containing the SLURM binaries, PATH lookup if unset
    #[arg(long, env = "JUVIZ_SLURM_BIN", global = true)]
    slurm_bin: Option<PathBuf>,

    /// Settings schema to use instead of the built-in one
    #[arg(long, env = "JUVIZ_SETTINGS_SCHEMA", global = true)]
    schema: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show or edit job settings
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Print the job script a launch would submit
    Render {
        /// Job script template to use instead of the built-in one
        #[arg(long)]
        template: Option<PathBuf>,
        /// Write the script here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Submit a ParaView server job and wait until it can be connected to
    Launch {
        #[arg(long)]
        template: Option<PathBuf>,
        /// Print the job id and exit without waiting
        #[arg(long)]
        detach: bool,
    },
    /// Ask the scheduler for the state of a job
    Status { job_id: String },
    /// Cancel a job
    Stop { job_id: String },
    /// List your ParaView server jobs
    Servers,
    /// Show the accounts and partitions you can submit to
    User,
    /// trame apps found on JUPYTER_PATH
    #[command(subcommand)]
    Apps(AppsCommand),
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Print every setting with its default and description
    Show,
    /// Change a setting, VALUE is read as JSON and falls back to a plain string
    Set { key: String, value: String },
    /// Go back to the default value
    Reset { key: String },
}

#[derive(Subcommand)]
enum AppsCommand {
    List,
    /// Start an app and keep it running until interrupted
    Launch {
        app: String,
        /// Instance name [default: app name]
        #[arg(long)]
        name: Option<String>,
        /// Data directory handed to the app [default: $HOME]
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("terve! starting up :)");

    let cli = Cli::parse();
    let wd = working_directory(cli.work_dir)?;
    let scheduler: Arc<dyn Scheduler> = Arc::new(Slurm::new(cli.slurm_bin));
    let format = cli.format;
    let schema = cli.schema.as_deref();

    match cli.command {
        Command::Settings(command) => settings(&wd, schema, command, format),
        Command::Render { template, output } => {
            let panel = Panel::new(open_settings(&wd, schema)?, scheduler, load_template(template)?);
            let script = panel.render()?;
            match output {
                Some(path) => {
                    fs::write(&path, script).with_context(|| format!("can't write {}", path.display()))?;
                    info!("Job script written to {}", path.display());
                }
                None => print!("{script}"),
            }
            Ok(())
        }
        Command::Launch { template, detach } => launch(&wd, schema, scheduler, template, detach, format).await,
        Command::Status { job_id } => {
            let id = parse_job_id(&job_id)?;
            let state = poll_status(scheduler.as_ref(), &id).await?;
            println!("{}", format.render(&state, |state| format!("{id} {state}"))?);
            Ok(())
        }
        Command::Stop { job_id } => {
            scheduler.cancel(&parse_job_id(&job_id)?).await?;
            Ok(())
        }
        Command::Servers => {
            let servers = scheduler.running_servers().await?;
            let text = |servers: &Vec<ParaViewServer>| {
                servers
                    .iter()
                    .map(|s| {
                        format!(
                            "{}\t{}\t{}\t{}\t{}\t{}",
                            s.id,
                            s.name,
                            s.state,
                            s.partition,
                            s.nodes.as_deref().unwrap_or("-"),
                            s.time_left.as_deref().unwrap_or("-")
                        )
                    })
                    .collect::<Vec<String>>()
                    .join("\n")
            };
            println!("{}", format.render(&servers, text)?);
            Ok(())
        }
        Command::User => {
            let user = scheduler.user_data().await?;
            let text = |user: &UserData| {
                format!(
                    "user: {}\naccounts: {}\npartitions: {}\nhome: {}",
                    user.name,
                    user.accounts.join(", "),
                    user.partitions.join(", "),
                    user.home.as_ref().map(|home| home.display().to_string()).unwrap_or_default()
                )
            };
            println!("{}", format.render(&user, text)?);
            Ok(())
        }
        Command::Apps(command) => apps(&wd, command, format).await,
    }
}

fn working_directory(path: Option<PathBuf>) -> Result<WorkingDirectory> {
    let path = match path {
        Some(path) => path,
        None => PathBuf::from(env::var_os("HOME").context("HOME is not set, pass --work-dir")?).join(".juviz"),
    };
    fs::create_dir_all(&path).with_context(|| format!("can't create {}", path.display()))?;
    Ok(WorkingDirectory { path })
}

fn open_settings(wd: &WorkingDirectory, schema: Option<&Path>) -> Result<SettingsRegistry> {
    let schema = match schema {
        Some(path) => SettingsSchema::from_path(path)?,
        None => SettingsSchema::embedded()?,
    };
    let conn = open_db(wd).context("can't open settings database")?;
    Ok(SettingsRegistry::open(conn, schema)?)
}

fn load_template(path: Option<PathBuf>) -> Result<ScriptTemplate> {
    Ok(match path {
        Some(path) => ScriptTemplate::from_path(&path)?,
        None => ScriptTemplate::embedded(),
    })
}

fn parse_job_id(text: &str) -> Result<JobId> {
    JobId::parse(text).with_context(|| format!("{text:?} is not a SLURM job id"))
}

/// Setting values are JSON, bare words are taken as strings
fn parse_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn settings(
    wd: &WorkingDirectory,
    schema: Option<&Path>,
    command: SettingsCommand,
    format: OutputFormat,
) -> Result<()> {
    let mut registry = open_settings(wd, schema)?;
    match command {
        SettingsCommand::Show => {
            let fields = registry.fields();
            let text = |fields: &Vec<SettingField>| {
                fields
                    .iter()
                    .map(|field| {
                        format!(
                            "{} ({}) = {}  [default: {}]\n    {}",
                            field.title, field.key, field.value, field.default, field.description
                        )
                    })
                    .collect::<Vec<String>>()
                    .join("\n")
            };
            println!("{}", format.render(&fields, text)?);
        }
        SettingsCommand::Set { key, value } => {
            registry.on_change(Box::new(|change: &SettingsChange| {
                info!("{}: {} -> {}", change.key, change.old, change.new);
            }));
            registry.set(&key, parse_value(&value))?;
        }
        SettingsCommand::Reset { key } => registry.reset(&key)?,
    }
    Ok(())
}

async fn launch(
    wd: &WorkingDirectory,
    schema: Option<&Path>,
    scheduler: Arc<dyn Scheduler>,
    template: Option<PathBuf>,
    detach: bool,
    format: OutputFormat,
) -> Result<()> {
    let mut panel = Panel::new(open_settings(wd, schema)?, scheduler, load_template(template)?);
    let mut status = panel.subscribe();
    let id = panel.launch().await?;
    if detach {
        println!("{}", format.render(&id, JobId::to_string)?);
        return Ok(());
    }

    let result = loop {
        tokio::select! {
            result = panel.wait() => break result,
            changed = status.changed() => {
                if changed.is_err() {
                    break panel.wait().await;
                }
                eprintln!("{}", *status.borrow_and_update());
            }
            _ = tokio::signal::ctrl_c() => {
                panel.close();
                bail!("interrupted, job {id} keeps running (juviz stop {id} cancels it)");
            }
        }
    };

    let target = result?;
    eprintln!("{}", panel.status());
    println!("{}", format.render(&target, |target| target.url.to_string())?);
    Ok(())
}

async fn apps(wd: &WorkingDirectory, command: AppsCommand, format: OutputFormat) -> Result<()> {
    let apps = discover_apps(env::var_os("JUPYTER_PATH").as_deref())?;
    match command {
        AppsCommand::List => {
            let text = |apps: &Vec<TrameApp>| {
                apps.iter()
                    .map(|app| format!("{}\t{}\t{}", app.name, app.display_name, app.path.display()))
                    .collect::<Vec<String>>()
                    .join("\n")
            };
            println!("{}", format.render(&apps, text)?);
        }
        AppsCommand::Launch { app, name, data } => {
            let app = find_app(&apps, &app)?;
            let data_directory = match data {
                Some(data) => data,
                None => PathBuf::from(env::var_os("HOME").context("HOME is not set, pass --data")?),
            };
            let options = LaunchOptions { name: name.unwrap_or_else(|| app.name.clone()), data_directory };
            let parameters = InstanceParameters::generate(&wd.path.join("runtime"))?;
            let mut instance = TrameInstance::launch(app, options, parameters)?;
            println!(
                "{}",
                format.render(&instance, |instance| format!(
                    "{} running on port {}, log in {}",
                    instance.name,
                    instance.parameters.port,
                    instance.parameters.log_file.display()
                ))?
            );

            tokio::select! {
                status = instance.wait() => {
                    let status = status?;
                    if !status.success() {
                        bail!("{} exited with {status}", instance.name);
                    }
                }
                _ = tokio::signal::ctrl_c() => instance.stop().await?,
            }
        }
    }
    Ok(())
}
