mod support;

use siprtc_log::caller::{CallerResolver, StackResolver};
use siprtc_log::{log_fields, CallerFrame, LogFields, Logger};

#[test]
fn resolves_the_calling_function() {
    let frame = StackResolver::default().resolve(1);
    assert!(frame.function.ends_with("resolves_the_calling_function"), "{:?}", frame);
    assert_eq!(frame.file, "tests/caller.rs");
    assert!(frame.line > 0);
}

#[test]
fn skip_beyond_the_stack_yields_sentinel() {
    assert_eq!(StackResolver::default().resolve(10_000), CallerFrame::unknown());
}

fn register_user(logger: &Logger) {
    logger.info("registered", log_fields! { "requestId" => "r-7" });
}

#[test]
fn facade_reports_the_application_function() {
    let (logger, buffer) = support::logger("debug");
    register_user(&logger);

    let line = &buffer.lines()[0];
    assert_eq!(line["func"], "register_user()");
    assert_eq!(line["requestId"], "r-7");
    assert!(line["file"].as_str().unwrap().starts_with("caller.rs:"));
    assert!(line["source"].as_str().unwrap().starts_with("tests/caller.rs:"));
}

mod wrapper {
    use siprtc_log::{LogFields, Logger};

    pub fn audit(logger: &Logger, msg: &str) {
        logger.warn(msg, LogFields::new());
    }
}

fn rotate_keys(logger: &Logger) {
    wrapper::audit(logger, "rotated");
}

#[test]
fn wrapper_modules_can_be_stepped_over() {
    let (mut logger, buffer) = support::logger("debug");
    logger.set_resolver(std::sync::Arc::new(
        StackResolver::default().skip_module(concat!(module_path!(), "::wrapper")),
    ));
    rotate_keys(&logger);
    assert_eq!(buffer.lines()[0]["func"], "rotate_keys()");
}

#[test]
fn disabled_resolution_keeps_file_but_not_function() {
    let buffer = support::Buffer::default();
    let mut config = siprtc_log::LoggerConfig::new("debug", "local0", "t");
    config.resolve_functions = false;
    let mut logger = Logger::init(&config).unwrap();
    logger.set_output(buffer.clone());

    logger.debug("m", LogFields::new());
    let line = &buffer.lines()[0];
    assert_eq!(line["func"], "?()");
    assert!(line["file"].as_str().unwrap().starts_with("caller.rs:"));
}
