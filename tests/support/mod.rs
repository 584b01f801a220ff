#![allow(dead_code)]

use serde_json::Value;
use siprtc_log::{Logger, LoggerConfig};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// In-memory log output shared with the test.
#[derive(Clone, Default)]
pub struct Buffer(Arc<Mutex<Vec<u8>>>);

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
    pub fn raw(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub fn lines(&self) -> Vec<Value> {
        self.raw()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }
}

pub fn logger(level: &str) -> (Logger, Buffer) {
    let buffer = Buffer::default();
    let mut logger = Logger::init(&LoggerConfig::new(level, "local0", "test")).unwrap();
    logger.set_output(buffer.clone());
    (logger, buffer)
}
