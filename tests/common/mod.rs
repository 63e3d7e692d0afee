#![allow(dead_code)]

pub mod trace {
    use std::sync::{Arc, Mutex};

    use stackrouter::{from_fn, Handler};

    /// Shared, thread-safe record of which handlers ran.
    #[derive(Clone, Default)]
    pub struct Trace(Arc<Mutex<Vec<String>>>);

    impl Trace {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, entry: impl Into<String>) {
            self.0.lock().unwrap().push(entry.into());
        }

        pub fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        /// Handler that records `label` and calls `next`.
        pub fn pass(&self, label: &'static str) -> impl Handler {
            let trace = self.clone();
            from_fn(move |_req, _res, next| {
                trace.push(label);
                next.call();
                Ok(())
            })
        }

        /// Handler that records `label` and sends it as the body.
        pub fn answer(&self, label: &'static str) -> impl Handler {
            let trace = self.clone();
            from_fn(move |_req, res, _next| {
                trace.push(label);
                res.send(label);
                Ok(())
            })
        }
    }
}

pub mod temp_files {
    use std::io::Write;

    use tempfile::NamedTempFile;

    /// Write `content` to a temporary file with the given extension.
    ///
    /// The file is removed when the handle is dropped.
    pub fn create_temp_config(content: &str, ext: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("stackrouter_test_")
            .suffix(&format!(".{ext}"))
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }
}

pub mod env {
    use std::sync::Mutex;

    /// Serialises tests that touch process environment variables.
    pub static ENV_LOCK: Mutex<()> = Mutex::new(());
}
