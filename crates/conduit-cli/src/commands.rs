use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use tracing::{info, warn};

use conduit_queue::{QueueError, QueuePublisher, QueueTransport};
use conduit_server::ingest::republish;
use conduit_server::{BasicAuthGate, ConduitServer, IngestHandler};
use conduit_store::{ObjectStore, ObjectStoreClient};
use conduit_triggers::{BlobTrigger, QueueReactor, QueueTrigger, StorageReactor};
use conduit_types::{Locator, LocatorScheme, PointerMessage};

use crate::cli::*;
use crate::settings::Settings;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    match cli.command {
        Command::Serve(args) => cmd_serve(settings, args).await,
        Command::Init(args) => cmd_init(settings, args).await,
        Command::Read(args) => cmd_read(settings, args).await,
        Command::Republish(args) => cmd_republish(settings, args).await,
        Command::Config(_) => cmd_config(&settings),
    }
}

async fn connect_store(settings: &Settings) -> anyhow::Result<ObjectStoreClient> {
    settings
        .storage
        .connect()
        .await
        .with_context(|| format!("opening storage '{}'", settings.storage.connection))
}

fn open_publisher(settings: &Settings) -> anyhow::Result<QueuePublisher> {
    let transport = settings
        .queue
        .open()
        .with_context(|| format!("opening queue '{}'", settings.queue.connection))?;
    Ok(QueuePublisher::new(transport))
}

fn parse_locator(text: &str) -> anyhow::Result<Locator> {
    let locator = Locator::parse(text).with_context(|| format!("invalid locator '{text}'"))?;
    if locator.scheme() == LocatorScheme::Memory {
        warn!("memory locators only resolve inside the process that wrote them");
    }
    Ok(locator)
}

async fn cmd_serve(mut settings: Settings, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        settings.server.bind_addr = bind;
    }
    let credential = settings.secrets().require(&settings.server.credential_key)?;

    let store = connect_store(&settings).await?;
    if !store.store().container_exists(store.container()).await? {
        anyhow::bail!(
            "container '{}' does not exist; run `conduit init` or set storage.create_container",
            store.container()
        );
    }
    let publisher = open_publisher(&settings)?;
    let queue = Arc::clone(publisher.transport());

    let mut triggers = Vec::new();
    if !args.no_triggers {
        triggers.push(QueueTrigger::spawn(
            Arc::clone(&queue),
            Arc::new(QueueReactor::new()),
            settings.triggers.clone(),
        ));
        triggers.push(BlobTrigger::spawn(
            store.store().as_ref(),
            store.container(),
            Arc::new(StorageReactor::new(store.clone())),
        ));
    }

    let ingest = IngestHandler::new(BasicAuthGate::new(credential), store, publisher);
    let server = ConduitServer::new(settings.server.clone(), ingest);
    println!(
        "{} Conduit listening on {} (storage: {}, queue: {})",
        "✓".green().bold(),
        settings.server.bind_addr.to_string().bold(),
        settings.storage.connection.cyan(),
        settings.queue.connection.cyan(),
    );

    server
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
        })
        .await?;

    for trigger in triggers {
        trigger.shutdown().await;
    }
    queue.close();
    println!("{} Conduit stopped.", "✓".green());
    Ok(())
}

async fn cmd_init(mut settings: Settings, args: InitArgs) -> anyhow::Result<()> {
    settings.storage.create_container = true;
    let store = connect_store(&settings).await?;
    println!(
        "{} Container {} ready ({})",
        "✓".green().bold(),
        store.container().yellow(),
        settings.storage.connection
    );

    let publisher = open_publisher(&settings)?;
    println!(
        "{} Queue {} ready ({}, {} pending)",
        "✓".green().bold(),
        publisher.queue_name().yellow(),
        settings.queue.connection,
        publisher.transport().len()
    );

    if let Some(path) = args.write_config {
        let text = toml::to_string_pretty(&settings.redacted())?;
        std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        println!("  Settings written to {}", path.display().to_string().bold());
    }
    Ok(())
}

async fn cmd_read(settings: Settings, args: ReadArgs) -> anyhow::Result<()> {
    let locator = parse_locator(&args.locator)?;
    let store = connect_store(&settings).await?;
    let content = store.read(&locator).await?;
    if args.raw {
        println!("{}", content.text());
        return Ok(());
    }
    let object = &content.object;
    println!("{} {}", "Object".bold(), object.name.yellow());
    println!("  Locator:      {}", object.locator.to_string().blue());
    println!("  Container:    {}", object.container);
    println!("  Content-Type: {}", object.content_type);
    println!("  Size:         {} bytes", object.size);
    println!("  Created:      {}", object.created_at.to_rfc3339());
    for (key, value) in &object.metadata {
        println!("  {}: {}", key.cyan(), value);
    }
    println!();
    println!("{}", content.text());
    Ok(())
}

async fn cmd_republish(settings: Settings, args: RepublishArgs) -> anyhow::Result<()> {
    if let Some(server) = &args.server {
        let locator = Locator::parse(&args.locator)
            .with_context(|| format!("invalid locator '{}'", args.locator))?;
        return republish_remote(&settings, server, &locator).await;
    }

    let locator = parse_locator(&args.locator)?;
    if settings.queue.is_in_memory() {
        anyhow::bail!(
            "queue '{}' is in-memory, so a pointer published here would never reach a consumer; \
             pass --server <url> to republish through the running server",
            settings.queue.connection
        );
    }
    let store = connect_store(&settings).await?;
    let transport = match settings.queue.open() {
        Ok(transport) => transport,
        Err(QueueError::Locked(path)) => anyhow::bail!(
            "queue journal {} is held by a running server; pass --server <url> to republish through it",
            path.display()
        ),
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("opening queue '{}'", settings.queue.connection)))
        }
    };
    let publisher = QueuePublisher::new(transport);
    let pointer = republish(&store, &publisher, &locator).await?;
    println!(
        "{} Republished {} to {}",
        "✓".green().bold(),
        pointer.locator.blue(),
        publisher.queue_name().yellow()
    );
    Ok(())
}

/// Ask a running server to republish, so the pointer goes through the queue
/// that server holds.
async fn republish_remote(settings: &Settings, server: &str, locator: &Locator) -> anyhow::Result<()> {
    let credential = settings.secrets().require(&settings.server.credential_key)?;
    let url = format!("{}/v1/republish", server.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .header(reqwest::header::AUTHORIZATION, format!("Basic {credential}"))
        .json(&PointerMessage::new(locator))
        .send()
        .await
        .with_context(|| format!("contacting {url}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("server refused republish ({status}): {body}");
    }
    let pointer: PointerMessage = response.json().await.context("decoding server response")?;
    println!(
        "{} Republished {} via {}",
        "✓".green().bold(),
        pointer.locator.blue(),
        server.yellow()
    );
    Ok(())
}

fn cmd_config(settings: &Settings) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(&settings.redacted())?);
    let key = &settings.server.credential_key;
    let status = if settings.secrets().get(key).is_some() {
        "configured".green()
    } else {
        "missing".red()
    };
    println!("# {key}: {status}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_settings(dir: &std::path::Path) -> Settings {
        let mut settings = Settings::default();
        settings.storage.connection = format!("file://{}", dir.join("objects").display());
        settings.queue.connection = format!("file://{}", dir.join("queue").display());
        settings
    }

    #[tokio::test]
    async fn init_provisions_container_and_queue() {
        let dir = tempfile::tempdir().unwrap();
        let settings = file_settings(dir.path());
        let config = dir.path().join("written.toml");
        cmd_init(
            settings.clone(),
            InitArgs {
                write_config: Some(config.clone()),
            },
        )
        .await
        .unwrap();

        assert!(dir.path().join("objects").join("payloads").is_dir());
        assert!(dir.path().join("queue").join("pointers.journal").is_file());
        let written = Settings::from_file(&config).unwrap();
        assert_eq!(written.storage.connection, settings.storage.connection);
    }

    #[tokio::test]
    async fn republish_enqueues_pointer_for_stored_object() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = file_settings(dir.path());
        settings.storage.create_container = true;
        let store = connect_store(&settings).await.unwrap();
        let object = store
            .create_text("a.json", "{}", conduit_types::CONTENT_TYPE_JSON, None)
            .await
            .unwrap();

        cmd_republish(
            settings.clone(),
            RepublishArgs {
                locator: object.locator.to_string(),
                server: None,
            },
        )
        .await
        .unwrap();

        let queue = settings.queue.open().unwrap();
        let delivery = queue.receive().await.unwrap();
        assert_eq!(delivery.message.label.as_deref(), Some(conduit_types::POINTER_LABEL));
        let pointer = conduit_types::PointerMessage::from_json(&delivery.message.body).unwrap();
        assert_eq!(pointer.locator().unwrap(), object.locator);
    }

    #[tokio::test]
    async fn republish_rejects_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = file_settings(dir.path());
        settings.storage.create_container = true;
        connect_store(&settings).await.unwrap();
        let root = std::fs::canonicalize(dir.path().join("objects")).unwrap();
        let missing = Locator::file(&root, "payloads", "nope.json").unwrap();

        let result = cmd_republish(
            settings.clone(),
            RepublishArgs {
                locator: missing.to_string(),
                server: None,
            },
        )
        .await;
        assert!(result.is_err());
        assert!(settings.queue.open().unwrap().is_empty());
    }

    #[tokio::test]
    async fn local_republish_refuses_in_memory_queue() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = file_settings(dir.path());
        settings.storage.create_container = true;
        settings.queue.connection = "memory:".into();
        let store = connect_store(&settings).await.unwrap();
        let object = store
            .create_text("c.json", "{}", conduit_types::CONTENT_TYPE_JSON, None)
            .await
            .unwrap();

        let err = cmd_republish(
            settings,
            RepublishArgs {
                locator: object.locator.to_string(),
                server: None,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("--server"), "{err}");
    }

    #[tokio::test]
    async fn local_republish_refuses_queue_held_by_server() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = file_settings(dir.path());
        settings.storage.create_container = true;
        let store = connect_store(&settings).await.unwrap();
        let object = store
            .create_text("d.json", "{}", conduit_types::CONTENT_TYPE_JSON, None)
            .await
            .unwrap();

        let held = settings.queue.open().unwrap();
        let err = cmd_republish(
            settings.clone(),
            RepublishArgs {
                locator: object.locator.to_string(),
                server: None,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("held by a running server"), "{err}");
        assert!(held.is_empty());
    }

    #[tokio::test]
    async fn republish_through_running_server() {
        use conduit_server::ServerConfig;

        let dir = tempfile::tempdir().unwrap();
        let mut settings = file_settings(dir.path());
        settings.storage.create_container = true;
        settings
            .secrets
            .insert("basic-auth.ingest".into(), "aW5nZXN0OnBhc3N3b3Jk".into());
        let store = connect_store(&settings).await.unwrap();
        let object = store
            .create_text("e.json", "{}", conduit_types::CONTENT_TYPE_JSON, None)
            .await
            .unwrap();

        let publisher = open_publisher(&settings).unwrap();
        let queue = Arc::clone(publisher.transport());
        let ingest = IngestHandler::new(
            BasicAuthGate::new("aW5nZXN0OnBhc3N3b3Jk"),
            store.clone(),
            publisher,
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(
            ConduitServer::new(ServerConfig::default(), ingest).serve_on(listener, async {
                let _ = stopped.await;
            }),
        );

        cmd_republish(
            settings.clone(),
            RepublishArgs {
                locator: object.locator.to_string(),
                server: Some(format!("http://{addr}")),
            },
        )
        .await
        .unwrap();

        let delivery = queue.receive().await.unwrap();
        let pointer = PointerMessage::from_json(&delivery.message.body).unwrap();
        assert_eq!(pointer.locator().unwrap(), object.locator);

        let missing = RepublishArgs {
            locator: Locator::file(&store_root(&settings), "payloads", "nope.json")
                .unwrap()
                .to_string(),
            server: Some(format!("http://{addr}")),
        };
        let err = cmd_republish(settings, missing).await.unwrap_err();
        assert!(err.to_string().contains("404"), "{err}");

        let _ = stop.send(());
        server.await.unwrap().unwrap();
    }

    fn store_root(settings: &Settings) -> std::path::PathBuf {
        let dir = settings.storage.connection.trim_start_matches("file://");
        std::fs::canonicalize(dir).unwrap()
    }

    #[tokio::test]
    async fn read_prints_stored_object() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = file_settings(dir.path());
        settings.storage.create_container = true;
        let store = connect_store(&settings).await.unwrap();
        let object = store
            .create_text("b.json", r#"{"id":"b"}"#, conduit_types::CONTENT_TYPE_JSON, None)
            .await
            .unwrap();

        for raw in [false, true] {
            cmd_read(
                settings.clone(),
                ReadArgs {
                    locator: object.locator.to_string(),
                    raw,
                },
            )
            .await
            .unwrap();
        }
        let bad = ReadArgs {
            locator: "s3://bucket/key".into(),
            raw: false,
        };
        assert!(cmd_read(settings, bad).await.is_err());
    }

    #[tokio::test]
    async fn serve_requires_credential() {
        let args = ServeArgs {
            bind: None,
            no_triggers: true,
        };
        let err = cmd_serve(Settings::default(), args).await.unwrap_err();
        assert!(err.to_string().contains("basic-auth.ingest"));
    }

    #[test]
    fn config_prints() {
        let mut settings = Settings::default();
        settings.secrets.insert("basic-auth.ingest".into(), "c2VjcmV0".into());
        cmd_config(&settings).unwrap();
    }
}
