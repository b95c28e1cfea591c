use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use log::info;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tokio::process::{Child, Command};

use crate::error::TrameError;
use crate::trame::TrameApp;

/// What the user picked in the launch dialog
#[derive(Clone, Debug)]
pub struct LaunchOptions {
    pub name: String,
    pub data_directory: PathBuf,
}

/// Generated per instance before the app starts
#[derive(Clone, Debug, Serialize)]
pub struct InstanceParameters {
    pub id: String,
    pub port: u16,
    pub log_file: PathBuf,
    #[serde(skip)]
    pub auth_key: String,
    pub auth_key_file: PathBuf,
}

impl InstanceParameters {
    /// Pick an id, a free port and an auth key; the key is written to a file only the user can read
    pub fn generate(runtime_dir: &Path) -> Result<InstanceParameters, TrameError> {
        fs::create_dir_all(runtime_dir).map_err(|err| TrameError::io(runtime_dir, err))?;

        let id: String = rand::random::<[u8; 8]>().iter().map(|b| format!("{b:02x}")).collect();
        let port = open_port().map_err(|err| TrameError::io(Path::new("0.0.0.0:0"), err))?;
        let auth_key: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(43)
            .map(char::from)
            .collect();

        let auth_key_file = runtime_dir.join(format!("{id}.key"));
        write_private(&auth_key_file, &auth_key).map_err(|err| TrameError::io(&auth_key_file, err))?;
        let log_file = runtime_dir.join(format!("{id}.log"));

        info!("Instance {id}: port {port}, log {}, key {}", log_file.display(), auth_key_file.display());
        Ok(InstanceParameters { id, port, log_file, auth_key, auth_key_file })
    }
}

/// Let the OS pick a free port
///
/// The port is released again before the app binds it, another process could take it first.
fn open_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(("0.0.0.0", 0))?;
    Ok(listener.local_addr()?.port())
}

fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)?.write_all(content.as_bytes())
}

/// Arguments handed to the app through `$JUVIZ_ARGS`
pub fn juviz_args(parameters: &InstanceParameters, data_directory: &Path) -> String {
    format!(
        "--port={} --data={} --authKeyFile={} --server",
        parameters.port,
        data_directory.display(),
        parameters.auth_key_file.display()
    )
}

/// A started trame app
#[derive(Debug, Serialize)]
pub struct TrameInstance {
    pub app: String,
    pub name: String,
    pub data_directory: PathBuf,
    #[serde(flatten)]
    pub parameters: InstanceParameters,
    #[serde(skip)]
    child: Child,
}

impl TrameInstance {
    /// Run the app's command through `sh -c`, output goes to the instance log file
    pub fn launch(app: &TrameApp, options: LaunchOptions, parameters: InstanceParameters) -> Result<TrameInstance, TrameError> {
        info!("Starting {} as {}", app.name, options.name);
        let log = File::create(&parameters.log_file).map_err(|err| TrameError::io(&parameters.log_file, err))?;
        let log_err = log.try_clone().map_err(|err| TrameError::io(&parameters.log_file, err))?;

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&app.command)
            .env("JUVIZ_ARGS", juviz_args(&parameters, &options.data_directory))
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true);
        if let Some(dir) = &app.working_directory {
            command.current_dir(dir);
        }
        let child = command.spawn().map_err(|err| TrameError::io(&app.path, err))?;

        Ok(TrameInstance {
            app: app.name.clone(),
            name: options.name,
            data_directory: options.data_directory,
            parameters,
            child,
        })
    }

    pub async fn wait(&mut self) -> Result<ExitStatus, TrameError> {
        let log_file = self.parameters.log_file.clone();
        self.child.wait().await.map_err(|err| TrameError::io(&log_file, err))
    }

    pub async fn stop(&mut self) -> Result<(), TrameError> {
        info!("Stopping instance {}", self.parameters.id);
        let log_file = self.parameters.log_file.clone();
        self.child.kill().await.map_err(|err| TrameError::io(&log_file, err))
    }
}
