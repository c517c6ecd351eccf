/**
 * AUDIT SINKS - Structured log of scheduling decisions and detections
 *
 * SINKS :
 * - mqtt : publishes JSON to `<prefix>/program@v1` and `<prefix>/model@v1`
 * - file : appends JSON lines to ProgramLog.jsonl / ModelLog.jsonl
 * - none : accepts and drops everything
 *
 * Every sink is best-effort. The poll loop logs a rejected record and moves on.
 */

use crate::config::{AuditConf, AuditSinkKind, MqttConf};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use suntrack_core::ports::{AuditError, AuditSink};
use suntrack_core::{ModelRecord, ProgramRecord};
use tokio::io::AsyncWriteExt;
use tokio::task;
use tracing::{debug, info, warn};

pub const PROGRAM_LOG: &str = "ProgramLog.jsonl";
pub const MODEL_LOG: &str = "ModelLog.jsonl";

pub async fn build_audit_sink(conf: &AuditConf) -> Arc<dyn AuditSink> {
    let sink: Arc<dyn AuditSink> = match conf.sink {
        AuditSinkKind::Mqtt => Arc::new(MqttAuditSink::connect(&conf.mqtt)),
        AuditSinkKind::File => match FileAuditSink::create(&conf.directory).await {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                warn!(
                    "audit directory {} unusable ({e}), audit disabled",
                    conf.directory.display()
                );
                Arc::new(NullAuditSink)
            }
        },
        AuditSinkKind::None => {
            info!("audit sink disabled");
            Arc::new(NullAuditSink)
        }
    };
    sink
}

pub struct MqttAuditSink {
    client: AsyncClient,
    // set on CONNACK, cleared on any event loop error
    connected: Arc<AtomicBool>,
    program_topic: String,
    model_topic: String,
}

impl MqttAuditSink {
    /// Creates the client and spawns its event loop; the broker connection
    /// is established (and re-established) in the background.
    pub fn connect(conf: &MqttConf) -> Self {
        let client_id = format!("suntrack-kernel-{}", uuid::Uuid::new_v4().simple());
        let mut opts = MqttOptions::new(client_id, &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 10);

        let connected = Arc::new(AtomicBool::new(false));
        let link = connected.clone();
        let broker = format!("{}:{}", conf.host, conf.port);
        task::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("[audit] connected to MQTT broker {broker}");
                        link.store(true, Ordering::SeqCst);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        link.store(false, Ordering::SeqCst);
                        warn!("[audit] MQTT error on {broker}: {e:?}");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });

        let (program_topic, model_topic) = topics(&conf.topic_prefix);
        info!("📡 audit records published under {}/", conf.topic_prefix);
        Self {
            client,
            connected,
            program_topic,
            model_topic,
        }
    }

    /// Never waits on the broker: a disconnected client or a full request
    /// queue rejects the record immediately.
    fn publish<T: Serialize>(&self, topic: &str, record: &T) -> Result<(), AuditError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("MQTT broker not connected".into()));
        }
        let payload = serde_json::to_vec(record)?;
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| AuditError::Unavailable(e.to_string()))
    }
}

fn topics(prefix: &str) -> (String, String) {
    let prefix = prefix.trim_end_matches('/');
    (format!("{prefix}/program@v1"), format!("{prefix}/model@v1"))
}

#[async_trait]
impl AuditSink for MqttAuditSink {
    async fn program(&self, record: &ProgramRecord) -> Result<(), AuditError> {
        self.publish(&self.program_topic, record)
    }

    async fn model(&self, record: &ModelRecord) -> Result<(), AuditError> {
        self.publish(&self.model_topic, record)
    }

    fn name(&self) -> &str {
        "mqtt"
    }
}

pub struct FileAuditSink {
    program_path: PathBuf,
    model_path: PathBuf,
    // serializes appends so concurrent records never interleave
    lock: tokio::sync::Mutex<()>,
}

impl FileAuditSink {
    pub async fn create(dir: &Path) -> Result<Self, AuditError> {
        tokio::fs::create_dir_all(dir).await?;
        Ok(Self {
            program_path: dir.join(PROGRAM_LOG),
            model_path: dir.join(MODEL_LOG),
            lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn append<T: Serialize>(&self, path: &Path, record: &T) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        debug!("audit record appended to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn program(&self, record: &ProgramRecord) -> Result<(), AuditError> {
        self.append(&self.program_path, record).await
    }

    async fn model(&self, record: &ModelRecord) -> Result<(), AuditError> {
        self.append(&self.model_path, record).await
    }

    fn name(&self) -> &str {
        "file"
    }
}

pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn program(&self, _record: &ProgramRecord) -> Result<(), AuditError> {
        Ok(())
    }

    async fn model(&self, _record: &ModelRecord) -> Result<(), AuditError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "none"
    }
}
