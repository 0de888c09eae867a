use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use livechat::settings::{SettingsError, SettingsStore};
use livechat::surface::{Surface, SurfaceAction, render_notice};
use livechat_client::{ChatClient, ClientError, WebSocketTransport};
use livechat_storage::{MemoryStore, SessionRecordStore, SqliteStorage, StorageError};
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Debug, Snafu)]
enum AppError {
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue {
        stage: &'static str,
        arg: &'static str,
    },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("failed to save settings: {source}"))]
    Settings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("failed to open session store: {source}"))]
    Storage {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("chat client failed: {source}"))]
    Client {
        stage: &'static str,
        source: ClientError,
    },
    #[snafu(display("terminal IO failed on `{stage}`: {source}"))]
    Terminal {
        stage: &'static str,
        source: std::io::Error,
    },
}

#[derive(Debug, Default)]
struct AppArgs {
    config_path: Option<PathBuf>,
    server_url: Option<String>,
}

impl AppArgs {
    fn parse(mut raw: impl Iterator<Item = String>) -> Result<Self, AppError> {
        let mut args = Self::default();
        while let Some(arg) = raw.next() {
            match arg.as_str() {
                "--config" => {
                    let value = raw.next().context(MissingArgumentValueSnafu {
                        stage: "parse-args-config",
                        arg: "--config",
                    })?;
                    args.config_path = Some(PathBuf::from(value));
                }
                "--server" => {
                    let value = raw.next().context(MissingArgumentValueSnafu {
                        stage: "parse-args-server",
                        arg: "--server",
                    })?;
                    args.server_url = Some(value);
                }
                _ => {
                    return UnknownArgumentSnafu {
                        stage: "parse-args",
                        raw: arg,
                    }
                    .fail();
                }
            }
        }

        Ok(args)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so they do not interleave with the chat transcript.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "livechat exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), AppError> {
    let args = AppArgs::parse(std::env::args().skip(1))?;

    let settings_store = match args.config_path {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::load(),
    };
    if let Some(server_url) = args.server_url {
        let mut settings = (*settings_store.settings()).clone();
        settings.server_url = server_url;
        settings_store.update(settings).context(SettingsSnafu {
            stage: "persist-server-override",
        })?;
    }
    let settings = settings_store.settings();

    let store: Arc<dyn SessionRecordStore> = match settings.database_location() {
        Some(location) => Arc::new(SqliteStorage::open(location).await.context(StorageSnafu {
            stage: "open-session-store",
        })?),
        None => Arc::new(MemoryStore::new()),
    };

    let transport = WebSocketTransport::new(settings.server_url.as_str()).context(ClientSnafu {
        stage: "build-transport",
    })?;
    let (client, mut notices) =
        ChatClient::spawn(settings.client_config(), &transport, store).context(ClientSnafu {
            stage: "spawn-client",
        })?;

    let mut surface = Surface::new();
    let mut state_rx = client.subscribe();
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut output = tokio::io::stdout();

    let initial = state_rx.borrow_and_update().clone();
    write_lines(&mut output, surface.render_changes(&initial)).await?;

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                write_lines(&mut output, surface.render_changes(&state)).await?;
            }
            notice = notices.recv() => {
                let Some(notice) = notice else {
                    break;
                };
                write_lines(&mut output, render_notice(&notice)).await?;
            }
            line = input.next_line() => {
                let Some(line) = line.context(TerminalSnafu { stage: "read-input-line" })? else {
                    break;
                };
                let state = client.state();
                let outcome = match surface.handle_line(&line, &state) {
                    SurfaceAction::Quit => break,
                    SurfaceAction::Say(text) => {
                        write_lines(&mut output, Some(text)).await?;
                        continue;
                    }
                    SurfaceAction::Start(visitor) => client.start_session(visitor).await,
                    SurfaceAction::Send(text) => client.send_message(text).await,
                    SurfaceAction::Reset => client.reset().await,
                };
                if let Err(error) = outcome {
                    write_lines(&mut output, Some(format!("! {error}"))).await?;
                }
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

async fn write_lines(
    output: &mut tokio::io::Stdout,
    lines: impl IntoIterator<Item = String>,
) -> Result<(), AppError> {
    for line in lines {
        output
            .write_all(format!("{line}\n").as_bytes())
            .await
            .context(TerminalSnafu {
                stage: "write-output-line",
            })?;
    }
    output.flush().await.context(TerminalSnafu {
        stage: "flush-output",
    })
}
