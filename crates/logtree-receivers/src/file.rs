//! File tail receiver.
//!
//! The file is opened once and read incrementally: a `notify` watcher on the
//! parent directory forwards change signals over a channel, and a task reads
//! from the saved offset to the end of the file each time. A file that shrank
//! (truncated or rotated in place) is read again from the start.

use crate::factory::{self, ReceiverInfo};
use crate::lifecycle::Lifecycle;
use crate::{Receiver, ReceiverError};
use logtree_core::csv::{into_events, CsvConfig, CsvParser};
use logtree_core::{EventSink, LogEvent, SinkSlot};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::ffi::OsString;
use std::io::{BufRead, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub const KIND: &str = "csv-file";

const SAMPLE_CONFIG: &str = r#"<target name="CsvLog"
        xsi:type="File"
        fileName="${basedir}/Logs/log.csv"
        archiveFileName="${basedir}/Logs/Archives/log_{#}_${date:format=yyyy-MM-d_HH}.txt"
        archiveEvery="Hour"
        archiveNumbering="Sequence"
        maxArchiveFiles="30000"
        concurrentWrites="true"
        keepFileOpen="false"
        >
    <layout xsi:type="CSVLayout">
    <column name="sequence" layout="${counter}" />
    <column name="time" layout="${date:format=yyyy/MM/dd HH\:mm\:ss.fff}" />
    <column name="level" layout="${level}"/>
    <column name="thread" layout="${threadid}"/>
    <column name="class" layout="${callsite:className=true:methodName=false:fileName=false:includeSourcePath=false}" />
    <column name="method" layout="${callsite:className=false:methodName=true:fileName=false:includeSourcePath=false}" />
    <column name="message" layout="${message}" />
    <column name="exception" layout="${exception:format=Message,Type,StackTrace}" />
    <column name="file" layout="${callsite:className=false:methodName=false:fileName=true:includeSourcePath=true}" />
    </layout>
</target>"#;

pub const INFO: ReceiverInfo = ReceiverInfo {
    kind: KIND,
    name: "CSV file",
    description: "Tails a CSV log file and picks up appended records as they are written.",
    sample_config: SAMPLE_CONFIG,
    build,
};

fn build(value: serde_json::Value) -> Result<Box<dyn Receiver>, ReceiverError> {
    Ok(Box::new(FileReceiver::new(factory::settings(KIND, value)?)))
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileSettings {
    pub path: PathBuf,
    /// Read the existing content on attach instead of starting at the end.
    #[serde(default)]
    pub show_from_beginning: bool,
    /// Display name; defaults to the file name.
    #[serde(default)]
    pub logger_name: Option<String>,
    #[serde(default)]
    pub csv: CsvConfig,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            show_from_beginning: false,
            logger_name: None,
            csv: CsvConfig::default(),
        }
    }
}

/// Read position plus the parser state for the tailed file.
struct Tail {
    file: tokio::fs::File,
    offset: u64,
    parser: CsvParser,
}

impl Tail {
    async fn read_new(&mut self) -> std::io::Result<Vec<LogEvent>> {
        let len = self.file.metadata().await?.len();
        if len < self.offset {
            debug!(offset = self.offset, len, "file shrank; reading from the start");
            self.offset = 0;
            self.parser.reset();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        self.file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::with_capacity((len - self.offset) as usize);
        let read = (&mut self.file).take(len - self.offset).read_to_end(&mut buf).await?;
        self.offset += read as u64;
        trace!(bytes = read, offset = self.offset, "read appended content");

        Ok(into_events(self.parser.feed(&buf)))
    }
}

pub struct FileReceiver {
    settings: FileSettings,
    sink: SinkSlot,
    lifecycle: Lifecycle,
    watcher: Option<RecommendedWatcher>,
    /// Wakes the tail task; used to read pending content on attach.
    poke: Option<mpsc::UnboundedSender<()>>,
}

impl FileReceiver {
    pub fn new(settings: FileSettings) -> Self {
        Self {
            settings,
            sink: SinkSlot::new(),
            lifecycle: Lifecycle::default(),
            watcher: None,
            poke: None,
        }
    }

    fn open(&self) -> Result<Tail, ReceiverError> {
        let path = &self.settings.path;
        let open_err = |source| ReceiverError::Open {
            path: path.clone(),
            source,
        };

        let mut file = std::fs::File::open(path).map_err(open_err)?;
        let mut parser = CsvParser::new(self.settings.csv.clone());

        if parser.header_pending() {
            let mut first = String::new();
            std::io::BufReader::new(&file)
                .read_line(&mut first)
                .map_err(open_err)?;
            parser.auto_configure_header(first.trim_end_matches(['\r', '\n']));
        }

        let offset = if self.settings.show_from_beginning {
            0
        } else {
            file.seek(SeekFrom::End(0)).map_err(open_err)?
        };

        Ok(Tail {
            file: tokio::fs::File::from_std(file),
            offset,
            parser,
        })
    }

    fn watch(&self, tx: mpsc::UnboundedSender<()>) -> Result<RecommendedWatcher, ReceiverError> {
        let path = &self.settings.path;
        let watch_err = |source| ReceiverError::Watch {
            path: path.clone(),
            source,
        };

        let file_name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str())) {
                        let _ = tx.send(());
                    }
                }
                Err(e) => warn!(error = %e, "file watcher error"),
            }
        })
        .map_err(watch_err)?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(watch_err)?;
        Ok(watcher)
    }
}

impl Receiver for FileReceiver {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn display_name(&self) -> String {
        let name = match &self.settings.logger_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self
                .settings
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.settings.path.display().to_string()),
        };
        format!("Log File [{name}]")
    }

    fn sample_client_config(&self) -> &'static str {
        SAMPLE_CONFIG
    }

    fn initialize(&mut self) -> Result<(), ReceiverError> {
        if self.lifecycle.is_running() {
            return Ok(());
        }
        let runtime = Lifecycle::runtime()?;

        let tail = self.open()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = self.watch(tx.clone())?;

        let token = self.lifecycle.begin();
        debug!(path = %self.settings.path.display(), offset = tail.offset, "tailing file");

        runtime.spawn(tail_loop(
            tail,
            rx,
            self.sink.clone(),
            token,
        ));
        self.watcher = Some(watcher);
        self.poke = Some(tx);
        Ok(())
    }

    fn attach(&mut self, sink: Arc<dyn EventSink>) {
        self.sink.attach(sink);
        if let Some(poke) = &self.poke {
            let _ = poke.send(());
        }
    }

    fn detach(&mut self) {
        self.sink.detach();
    }

    fn terminate(&mut self) {
        if self.lifecycle.stop() {
            debug!(path = %self.settings.path.display(), "file receiver stopped");
        }
        self.watcher = None;
        self.poke = None;
    }
}

async fn tail_loop(
    mut tail: Tail,
    mut rx: mpsc::UnboundedReceiver<()>,
    sink: SinkSlot,
    token: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            _ = token.cancelled() => break,
            signal = rx.recv() => signal,
        };
        if signal.is_none() {
            break;
        }
        // Collapse a burst of change notifications into one read.
        while rx.try_recv().is_ok() {}

        // Unread content stays in the file until someone is listening.
        if !sink.is_attached() {
            continue;
        }

        let read = tail.read_new().await;
        match read {
            Ok(events) => sink.notify_batch(events),
            Err(e) => warn!(error = %e, "failed to read tailed file"),
        }
    }
}
