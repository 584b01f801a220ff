use crate::caller::{CallerFrame, CallerResolver, DisabledResolver, StackResolver};
use crate::caller_hook::CallerHook;
use crate::config::LoggerConfig;
use crate::dispatch::{DispatchConfig, SinkDispatcher};
use crate::entry::Entry;
use crate::error_hook::{ErrorHook, ERROR_FIELD};
use crate::field::{ErrorValue, FieldValue, Fields};
use crate::formatter::{Formatter, JsonFormatter};
use crate::hook::{Hook, Hooks};
use crate::level::Level;
use crate::record::LogRecord;
use crate::sink::{LogSink, SinkError};
use crate::syslog::{Facility, SyslogSink};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::Display;
use std::io::{self, Write};
use std::panic::Location;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Starting depth for the function-name lookup done by the facade methods:
/// the resolver's own frame and [`Logger`]'s call-site helper. The remaining
/// facade frames are stepped over by the resolver.
pub const FACADE_SKIP: usize = 2;

/// Caller-supplied fields of a facade call.
pub type LogFields = Fields;

/// Called with the exit status after a `fatal` entry has been emitted.
pub type ExitHandler = Arc<dyn Fn(i32) + Send + Sync>;

/// Error returned while constructing a [`Logger`].
#[derive(thiserror::Error, Debug)]
pub enum LoggerError {
    #[error("failed to configure syslog: {0}")]
    Syslog(#[source] SinkError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Leveled logger with an enrichment hook pipeline.
///
/// Configure it with the `&mut self` methods, then share it behind an
/// [`Arc`]; every logging method takes `&self` and may be called from any
/// number of threads.
pub struct Logger {
    level: Level,
    formatter: Arc<dyn Formatter>,
    hooks: Hooks,
    out: Mutex<Box<dyn Write + Send>>,
    sinks: Vec<SinkDispatcher>,
    tasks: Vec<JoinHandle<()>>,
    resolver: Arc<dyn CallerResolver>,
    exit: ExitHandler,
    dispatch: DispatchConfig,
    diagnostics: Vec<String>,
}

impl Logger {
    /// Logger writing JSON to stderr at `level`, with no hooks and no sinks.
    pub fn with_level(level: Level) -> Self {
        Logger {
            level,
            formatter: Arc::new(JsonFormatter::default()),
            hooks: Hooks::new(),
            out: Mutex::new(Box::new(io::stderr())),
            sinks: Vec::new(),
            tasks: Vec::new(),
            resolver: Arc::new(StackResolver::default()),
            exit: Arc::new(|code| std::process::exit(code)),
            dispatch: DispatchConfig::default(),
            diagnostics: Vec::new(),
        }
    }

    /// Build a logger from `config`.
    ///
    /// **Steps**
    /// 1. Resolve the level name (unknown names become `debug`).
    /// 2. Use the JSON formatter.
    /// 3. With an error-tracking DSN: resolve the hostname and register the
    ///    error-tracking sink for `error`, `fatal` and `panic`. A missing
    ///    Tokio runtime is returned; hostname and client failures terminate
    ///    the process through [`guard_critical`].
    /// 4. With a syslog address: resolve the facility (unknown names become
    ///    `local0`) and dial the syslog sink. A dial failure is returned.
    /// 5. Register [`ErrorHook`], then [`CallerHook`].
    ///
    /// Network sinks are driven by the current Tokio runtime; configuring
    /// one outside a runtime is an error.
    pub fn new(config: &LoggerConfig) -> Result<Self, LoggerError> {
        let level = match config.level.parse::<Level>() {
            Ok(level) => level,
            Err(e) => {
                let mut logger = Logger::with_level(Level::DEFAULT);
                logger
                    .diagnostics
                    .push(format!("{}, falling back to {}", e, Level::DEFAULT));
                return logger.configure(config);
            }
        };
        Logger::with_level(level).configure(config)
    }

    /// [`Logger::new`] with HTML escaping turned off in the JSON output.
    pub fn init(config: &LoggerConfig) -> Result<Self, LoggerError> {
        let mut logger = Logger::new(config)?;
        logger.set_formatter(JsonFormatter::new().without_html_escape());
        Ok(logger)
    }

    fn configure(mut self, config: &LoggerConfig) -> Result<Self, LoggerError> {
        self.dispatch = config.dispatch.clone();
        if !config.resolve_functions {
            self.resolver = Arc::new(DisabledResolver);
        }

        if let Some(dsn) = config.sentry_dsn() {
            Handle::try_current().map_err(|_| SinkError::NoRuntime)?;
            let hostname = guard_critical("determining hostname failed", local_hostname());

            let mut tags = BTreeMap::new();
            tags.insert("tag".to_string(), config.tag.clone());
            tags.insert("hostname".to_string(), hostname.clone());

            let sink = guard_critical(
                "configuring sentry failed",
                error_tracking_sink(dsn, tags, &hostname, &self.dispatch),
            );
            guard_critical(
                "configuring sentry failed",
                self.add_sink(sink, &[Level::Panic, Level::Fatal, Level::Error]),
            );
        }

        if let Some(addr) = config.syslog_addr() {
            let facility = match config.facility.parse::<Facility>() {
                Ok(facility) => facility,
                Err(_) => {
                    let msg = format!("Unsupported log facility, falling back to {}", Facility::DEFAULT);
                    println!("{}", msg);
                    self.diagnostics.push(msg);
                    Facility::DEFAULT
                }
            };
            let sink = SyslogSink::dial(addr, facility, &config.tag).map_err(LoggerError::Syslog)?;
            self.add_sink(Arc::new(sink), &Level::ALL)?;
            self.set_formatter(JsonFormatter::default());
        }

        self.add_hook(Arc::new(ErrorHook::default()));
        let caller_hook = CallerHook::default().with_resolver(Arc::clone(&self.resolver));
        self.add_hook(Arc::new(caller_hook));
        Ok(self)
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn set_level(&mut self, level: Level) {
        self.level = level;
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        level >= self.level
    }

    pub fn set_formatter(&mut self, formatter: impl Formatter + 'static) {
        self.formatter = Arc::new(formatter);
    }

    pub fn set_output(&mut self, out: impl Write + Send + 'static) {
        self.out = Mutex::new(Box::new(out));
    }

    pub fn set_resolver(&mut self, resolver: Arc<dyn CallerResolver>) {
        self.resolver = resolver;
    }

    /// Replace what happens after a `fatal` entry (default: exit the
    /// process with the given status).
    pub fn set_exit_handler(&mut self, exit: impl Fn(i32) + Send + Sync + 'static) {
        self.exit = Arc::new(exit);
    }

    /// Append a hook; hooks run in the order they were added.
    pub fn add_hook(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.add(hook);
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Route entries at `levels` to `sink` through a background dispatcher.
    pub fn add_sink(&mut self, sink: Arc<dyn LogSink>, levels: &[Level]) -> Result<(), SinkError> {
        let (dispatcher, task) = SinkDispatcher::spawn(sink, levels, &self.dispatch)?;
        self.sinks.push(dispatcher);
        self.tasks.push(task);
        Ok(())
    }

    pub fn sinks(&self) -> &[SinkDispatcher] {
        &self.sinks
    }

    /// Fallbacks taken during construction (unknown level or facility).
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Close every sink and wait up to `timeout` per sink for queued
    /// records to be delivered.
    pub async fn shutdown(mut self, timeout: Duration) {
        self.sinks.clear();
        for task in self.tasks.drain(..) {
            if tokio::time::timeout(timeout, task).await.is_err() {
                eprintln!("log sink did not drain within {:?}", timeout);
            }
        }
    }

    /// Run `entry` through the level gate, the hooks, the formatter and
    /// every sink registered for its level.
    pub fn emit(&self, mut entry: Entry) {
        if !self.is_enabled(entry.level) {
            return;
        }

        self.hooks.fire(&mut entry);

        let line = match self.formatter.format(&entry) {
            Ok(line) => line,
            Err(e) => {
                eprintln!("Failed to format log entry: {}", e);
                return;
            }
        };
        self.write_line(&line);

        if self.sinks.iter().any(|s| s.accepts(entry.level)) {
            let record = LogRecord::from_entry(&entry, line);
            for sink in self.sinks.iter().filter(|s| s.accepts(entry.level)) {
                sink.dispatch(record.clone());
            }
        }
    }

    fn write_line(&self, line: &str) {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(out, "{}", line) {
            eprintln!("Failed to write to log, {}", e);
        }
    }

    fn call_site(&self, location: &Location<'_>) -> CallerFrame {
        let resolved = self.resolver.resolve(FACADE_SKIP);
        CallerFrame::from_location(location).with_function(resolved.function)
    }

    #[track_caller]
    fn log_at(&self, level: Level, msg: &str, fields: LogFields) {
        if !self.is_enabled(level) {
            return;
        }
        let caller = self.call_site(Location::caller());
        let entry = Entry::new(level, msg)
            .with_fields(fields)
            .with_field("file", caller.file_line())
            .with_field("func", caller.short_function())
            .with_caller(caller);
        self.emit(entry);
    }

    #[track_caller]
    pub fn trace(&self, msg: &str, fields: LogFields) {
        self.log_at(Level::Trace, msg, fields);
    }

    #[track_caller]
    pub fn debug(&self, msg: &str, fields: LogFields) {
        self.log_at(Level::Debug, msg, fields);
    }

    #[track_caller]
    pub fn info(&self, msg: &str, fields: LogFields) {
        self.log_at(Level::Info, msg, fields);
    }

    #[track_caller]
    pub fn warn(&self, msg: &str, fields: LogFields) {
        self.log_at(Level::Warn, msg, fields);
    }

    #[track_caller]
    pub fn error(&self, msg: &str, fields: LogFields) {
        self.log_at(Level::Error, msg, fields);
    }

    /// Emit at `fatal`, wait for the sinks routed `fatal` entries, then
    /// call the exit handler with status 1.
    #[track_caller]
    pub fn fatal(&self, msg: &str, fields: LogFields) {
        self.log_at(Level::Fatal, msg, fields);
        self.drain_sinks(Level::Fatal);
        (self.exit)(1);
    }

    /// Emit at `panic`, wait for the sinks routed `panic` entries, then
    /// panic with `msg`.
    #[track_caller]
    pub fn panic(&self, msg: &str, fields: LogFields) -> ! {
        self.log_at(Level::Panic, msg, fields);
        self.drain_sinks(Level::Panic);
        panic!("{}", msg);
    }

    /// Block until every sink accepting `level` has delivered its queue, at
    /// most the configured send timeout per sink.
    fn drain_sinks(&self, level: Level) {
        let wait = self.dispatch.send_timeout();
        for sink in self.sinks.iter().filter(|s| s.accepts(level)) {
            if !sink.flush_blocking(wait) {
                eprintln!("log sink {} did not drain within {:?}", sink.name(), wait);
            }
        }
    }

    pub fn with_field(&self, key: impl Into<String>, value: impl Into<FieldValue>) -> EntryBuilder<'_> {
        EntryBuilder::new(self).with_field(key, value)
    }

    pub fn with_fields(&self, fields: Fields) -> EntryBuilder<'_> {
        EntryBuilder::new(self).with_fields(fields)
    }

    pub fn with_error(&self, err: &(dyn Error + 'static)) -> EntryBuilder<'_> {
        EntryBuilder::new(self).with_error(err)
    }

    /// Add string pairs to `builder`, in key order.
    pub fn build_log_entry<'a>(&self, builder: EntryBuilder<'a>, pairs: &HashMap<String, String>) -> EntryBuilder<'a> {
        builder.with_string_fields(pairs)
    }
}

/// Fields accumulated before a single log call.
///
/// Entries logged through a builder are attributed to the builder's call
/// site; they do not get the facade's `file`/`func` fields.
pub struct EntryBuilder<'a> {
    logger: &'a Logger,
    fields: Fields,
}

impl<'a> EntryBuilder<'a> {
    fn new(logger: &'a Logger) -> Self {
        EntryBuilder {
            logger,
            fields: Fields::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key, value);
        self
    }

    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Attach `err` as the structured `error` field.
    pub fn with_error(self, err: &(dyn Error + 'static)) -> Self {
        self.with_field(ERROR_FIELD, ErrorValue::with_backtrace(err))
    }

    pub fn with_string_fields(mut self, pairs: &HashMap<String, String>) -> Self {
        let sorted: BTreeMap<&String, &String> = pairs.iter().collect();
        for (k, v) in sorted {
            self.fields.insert(k.clone(), v.clone());
        }
        self
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    #[track_caller]
    pub fn log(self, level: Level, msg: &str) {
        if !self.logger.is_enabled(level) {
            return;
        }
        let caller = CallerFrame::from_location(Location::caller());
        let entry = Entry::new(level, msg).with_fields(self.fields).with_caller(caller);
        self.logger.emit(entry);
    }

    #[track_caller]
    pub fn trace(self, msg: &str) {
        self.log(Level::Trace, msg);
    }

    #[track_caller]
    pub fn debug(self, msg: &str) {
        self.log(Level::Debug, msg);
    }

    #[track_caller]
    pub fn info(self, msg: &str) {
        self.log(Level::Info, msg);
    }

    #[track_caller]
    pub fn warn(self, msg: &str) {
        self.log(Level::Warn, msg);
    }

    #[track_caller]
    pub fn error(self, msg: &str) {
        self.log(Level::Error, msg);
    }

    #[track_caller]
    pub fn fatal(self, msg: &str) {
        let logger = self.logger;
        self.log(Level::Fatal, msg);
        logger.drain_sinks(Level::Fatal);
        (logger.exit)(1);
    }

    #[track_caller]
    pub fn panic(self, msg: &str) -> ! {
        let logger = self.logger;
        self.log(Level::Panic, msg);
        logger.drain_sinks(Level::Panic);
        panic!("{}", msg);
    }
}

/// Abort the process when a required setup step failed.
///
/// Prints `CRITICAL: <msg>: <err>` and exits with status -1. Only meant for
/// logger construction, never for steady-state logging.
pub fn guard_critical<T, E: Display>(msg: &str, result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            println!("CRITICAL: {}: {}", msg, e);
            std::process::exit(-1);
        }
    }
}

fn local_hostname() -> io::Result<String> {
    hostname::get()?
        .into_string()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "hostname is not valid UTF-8"))
}

#[cfg(feature = "sentry")]
fn error_tracking_sink(
    dsn: &str,
    tags: BTreeMap<String, String>,
    hostname: &str,
    dispatch: &DispatchConfig,
) -> Result<Arc<dyn LogSink>, SinkError> {
    use crate::sentry::SentrySink;

    let sink = SentrySink::new(dsn, tags, hostname, dispatch.send_timeout())?;
    Ok(Arc::new(sink) as Arc<dyn LogSink>)
}

#[cfg(not(feature = "sentry"))]
fn error_tracking_sink(
    _dsn: &str,
    _tags: BTreeMap<String, String>,
    _hostname: &str,
    _dispatch: &DispatchConfig,
) -> Result<Arc<dyn LogSink>, SinkError> {
    Err(SinkError::SentryFeatureDisabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_fields;
    use serde_json::Value;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn lines(&self) -> Vec<Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    fn logger(level: &str) -> (Logger, Buffer) {
        let buffer = Buffer::default();
        let mut logger = Logger::init(&LoggerConfig::new(level, "local0", "test")).unwrap();
        logger.set_output(buffer.clone());
        (logger, buffer)
    }

    #[test]
    fn unknown_level_falls_back_to_debug() {
        let (logger, _) = logger("bogus");
        assert_eq!(logger.level(), Level::Debug);
        assert_eq!(logger.diagnostics().len(), 1);
    }

    #[test]
    fn construction_registers_both_hooks() {
        let (logger, _) = logger("info");
        assert_eq!(logger.hooks().len(), 2);
        assert!(logger.sinks().is_empty());
    }

    #[test]
    fn facade_attaches_file_func_and_source() {
        let (logger, buffer) = logger("debug");
        logger.info("hello", log_fields! { "requestId" => "r-1" });
        let line = &buffer.lines()[0];

        let expected_line = line!() - 3;
        assert_eq!(line["level"], "info");
        assert_eq!(line["msg"], "hello");
        assert_eq!(line["requestId"], "r-1");
        assert_eq!(line["file"], format!("logger.rs:{}", expected_line));
        assert_eq!(line["source"], format!("src/logger.rs:{}", expected_line));
        assert!(line["func"].as_str().unwrap().ends_with("()"));
    }

    #[test]
    fn suppressed_levels_never_reach_output() {
        let (logger, buffer) = logger("warn");
        logger.info("quiet", LogFields::new());
        logger.debug("quiet", LogFields::new());
        logger.with_field("k", 1).info("quiet");
        logger.warn("loud", LogFields::new());
        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["level"], "warning");
    }

    #[test]
    fn fatal_runs_exit_handler_after_emitting() {
        let (mut logger, buffer) = logger("info");
        let code = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&code);
        logger.set_exit_handler(move |c| *seen.lock().unwrap() = Some(c));

        logger.fatal("going down", LogFields::new());
        assert_eq!(*code.lock().unwrap(), Some(1));
        assert_eq!(buffer.lines()[0]["level"], "fatal");
    }

    #[test]
    #[should_panic(expected = "unrecoverable")]
    fn panic_panics_after_emitting() {
        let (logger, _) = logger("info");
        logger.panic("unrecoverable", LogFields::new());
    }

    #[test]
    fn builder_string_fields_are_sorted_by_key() {
        let (logger, buffer) = logger("debug");
        let mut pairs = HashMap::new();
        pairs.insert("b".to_string(), "2".to_string());
        pairs.insert("a".to_string(), "1".to_string());
        let builder = logger.build_log_entry(logger.with_field("requestId", "r"), &pairs);
        let keys: Vec<&str> = builder.fields().iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["requestId", "a", "b"]);
        builder.info("m");
        assert_eq!(buffer.lines()[0]["a"], "1");
    }

    #[test]
    fn structured_error_is_normalized_in_output() {
        let (logger, buffer) = logger("debug");
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        logger.with_error(&err).error("dial failed");
        let line = &buffer.lines()[0];
        assert_eq!(line["error"]["root"]["message"], "refused");
    }

    #[test]
    fn sentry_outside_runtime_is_returned_as_error() {
        let config = LoggerConfig::new("info", "local0", "t").with_sentry_dsn("https://k@errors.example.com/3");
        assert!(matches!(Logger::new(&config), Err(LoggerError::Sink(SinkError::NoRuntime))));
    }

    struct SlowSink {
        delivered: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl LogSink for SlowSink {
        async fn send(&self, _record: &LogRecord) -> Result<(), Box<dyn Error + Send + Sync>> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.delivered.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fatal_is_delivered_to_sinks_before_exit() {
        let (mut logger, _) = logger("info");
        let delivered = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let sink = SlowSink {
            delivered: Arc::clone(&delivered),
        };
        logger
            .add_sink(Arc::new(sink), &[Level::Error, Level::Fatal, Level::Panic])
            .unwrap();

        let at_exit = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&at_exit);
        let count = Arc::clone(&delivered);
        logger.set_exit_handler(move |_| {
            *seen.lock().unwrap() = Some(count.load(std::sync::atomic::Ordering::SeqCst));
        });

        logger.fatal("disk full", LogFields::new());
        assert_eq!(*at_exit.lock().unwrap(), Some(1));

        logger.with_field("requestId", "r").fatal("again");
        assert_eq!(*at_exit.lock().unwrap(), Some(2));
    }

    #[test]
    fn syslog_outside_runtime_is_returned_as_error() {
        let config = LoggerConfig::new("info", "local0", "t").with_syslog_addr("127.0.0.1:514");
        assert!(matches!(Logger::new(&config), Err(LoggerError::Syslog(SinkError::NoRuntime))));
    }
}
