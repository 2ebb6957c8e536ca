//! Shared state injected into the dispatcher and the reconciler worker:
//! the cluster client and caches, the task queue, the clock, and every
//! collaborator C8/C9/C10 need to drive the proxy (design doc §4, §5).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use crate::cache::Cache;
use crate::clock::Clock;
use crate::config::Config;
use crate::events::EventEmitter;
use crate::model::{ConfigurationModel, EffectiveConfig};
use crate::proxyctl::files::FileWriter;
use crate::proxyctl::process::ProcessHandle;
use crate::proxyctl::reload::ReloadController;
use crate::proxyctl::runtime_api::RuntimeApiUpdater;
use crate::queue::Queue;
use crate::template::Render;

/// What's currently installed for one master/standalone ingress: used to
/// detect which minion identities dropped out of a mergeable group between
/// syncs, so their locations are not left stranded in the rendered file
/// (design doc §4.4).
#[derive(Debug, Clone)]
pub struct InstalledIngress {
    pub namespace: String,
    pub name: String,
    pub minion_identities: HashSet<String>,
    /// The last `ConfigurationModel` rendered for this file_key, consulted
    /// by the ingress handler to decide between a runtime-API patch and a
    /// full reload (design doc §4.9, §4.10).
    pub last_model: ConfigurationModel,
}

pub struct Context {
    pub client: kube::Client,
    pub cache: Cache,
    pub queue: Queue,
    pub clock: Arc<dyn Clock>,
    pub config: Config,
    pub events: EventEmitter,
    pub writer: FileWriter,
    pub process: Arc<dyn ProcessHandle>,
    pub reload: ReloadController,
    pub runtime_api: Option<RuntimeApiUpdater>,
    pub template: Arc<dyn Render>,
    pub annotation_prefix: String,
    /// file_key -> installed state, consulted and updated by the
    /// reconciler's ingress handler only.
    pub registry: Mutex<std::collections::HashMap<String, InstalledIngress>>,
    /// The configmap-derived defaults every ingress resolves its own
    /// annotations on top of (design doc §3, §4.6). Updated only by the
    /// ConfigMap handler; read by every ingress sync.
    pub effective: RwLock<EffectiveConfig>,
}

impl Context {
    pub fn new(
        client: kube::Client,
        cache: Cache,
        config: Config,
        clock: Arc<dyn Clock>,
        template: Arc<dyn Render>,
    ) -> Self {
        let queue = Queue::new(clock.clone());
        let writer = FileWriter::new(config.config_root.clone(), config.local_mode);
        let process: Arc<dyn ProcessHandle> = if config.local_mode {
            Arc::new(crate::proxyctl::process::LocalHandle)
        } else {
            Arc::new(crate::proxyctl::process::ChildProcessHandle {
                binary: config.proxy_binary.clone(),
                config_path: writer.main_config_path(),
            })
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client builds with default TLS backend");

        let reload = ReloadController::new(
            FileWriter::new(config.config_root.clone(), config.local_mode),
            process.clone(),
            http.clone(),
            clock.clone(),
            config.proxy_control_url.clone(),
            config.reload_poll_interval,
            config.reload_poll_timeout,
        );
        let runtime_api = config
            .variant
            .is_commercial()
            .then(|| RuntimeApiUpdater::new(http.clone(), config.proxy_control_url.clone()));

        let events = EventEmitter::new(client.clone());
        let annotation_prefix = format!("{}.org", config.ingress_class);

        Context {
            client,
            cache,
            queue,
            clock,
            config,
            events,
            writer,
            process,
            reload,
            runtime_api,
            template,
            annotation_prefix,
            registry: Mutex::new(std::collections::HashMap::new()),
            effective: RwLock::new(EffectiveConfig::default()),
        }
    }
}
