mod cancel;
mod config;
mod executors;
mod extensions;
mod fetch;
mod fs_utils;
mod handoff;
mod host;
mod http;
mod layout;
mod manifest_fetch;
mod native;
mod orchestrator;
mod receipts;
mod runtime_log;
mod session;
mod status;
mod teardown;
mod transport;

pub use cancel::CancelFlag;
pub use config::{
    JobRegistration, RunConfig, StatusConfig, Timing, UiLaunch, DEFAULT_AGENT_IDENTIFIER,
    DEFAULT_DAEMON_IDENTIFIER, LAUNCH_AGENTS_DIR, LAUNCH_DAEMONS_DIR,
};
pub use executors::{
    execute_item, execute_package, execute_plugin, execute_root_script, execute_user_script,
    skip_criteria_matches, ExecContext, ItemOutcome, ItemStatus,
};
pub use extensions::{
    ExecItemHandler, ExecOptionsMiddleware, ExtensionRegistry, ItemHandler, OptionsMiddleware,
    ITEM_HANDLER_PREFIX, MIDDLEWARE_PREFIX,
};
pub use fetch::{verify_local_payload, FetchOutcome, IntegrityFetcher, PayloadKind};
pub use fs_utils::{remove_dir_if_exists, remove_file_if_exists};
pub use handoff::{run_companion, CompanionReport, Handoff, LaunchRequest};
pub use host::{CommandReport, ConsoleUser, Host, ScriptRun};
pub use http::HttpTransport;
pub use layout::{WorkLayout, DEFAULT_WORK_DIR};
pub use manifest_fetch::ManifestSource;
pub use native::NativeHost;
pub use orchestrator::{ItemRecord, Orchestrator, RunState, RunSummary};
pub use receipts::{installed_version_or_sentinel, NOT_INSTALLED_VERSION};
pub use runtime_log::{RuntimeLog, RuntimeRecord};
pub use session::{is_real_user_session, SessionGate, PLACEHOLDER_ACCOUNTS};
pub use status::{
    FanoutStatusSink, FileStatusSink, NullStatusSink, StageAwareSink, StatusEvent, StatusSink,
};
pub use teardown::{teardown, TeardownReport, TeardownStep};
pub use transport::{FetchProgress, FetchRequest, RequestOptions, Transport};
