use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use linecomp_context::{CompileRequest, ContextCompiler};
use linecomp_core::{SectionTag, SECTION_SEPARATOR};
use linecomp_infer::{FetchError, UrlReader};

/// Serves canned pages; the first URL is slowest so arrival order differs
/// from input order.
struct CannedReader {
    pages: HashMap<String, String>,
}

#[async_trait]
impl UrlReader for CannedReader {
    async fn read(&self, url: &str) -> Result<String, FetchError> {
        if url.ends_with("/slow") {
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        self.pages.get(url).cloned().ok_or(FetchError::Status {
            status: 404,
            body: "not found".to_owned(),
        })
    }
}

/// Log sink for asserting on emitted warnings.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer")).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn compiler(pages: &[(&str, &str)]) -> ContextCompiler {
    ContextCompiler::new(Arc::new(CannedReader {
        pages: pages
            .iter()
            .map(|(url, body)| (url.to_string(), body.to_string()))
            .collect(),
    }))
}

#[tokio::test]
async fn sections_follow_fixed_order_with_trailing_task() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("f.py"), "B").expect("write");

    let request = CompileRequest {
        main_text: Some("A".to_owned()),
        filepaths: vec!["f.py".to_owned()],
        urls: vec!["u".to_owned()],
        workspace_root: Some(dir.path().to_path_buf()),
        ..CompileRequest::default()
    };
    let compiler = compiler(&[("u", "C")]);

    let sections = compiler.compile_sections(&request).await;
    let outline = sections
        .iter()
        .map(|section| (section.tag, section.title.as_str(), section.body.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        outline,
        [
            (SectionTag::Task, "Main task", "A"),
            (SectionTag::File, "f.py", "B"),
            (SectionTag::Url, "u", "C"),
            (SectionTag::Task, "Main task", "A"),
        ]
    );
    assert_eq!(sections[1].language.as_deref(), Some("python"));

    let document = compiler.compile(&request).await;
    let parts = document.split(SECTION_SEPARATOR).collect::<Vec<_>>();
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[0], "<<<BEGIN TASK: Main task>>>\nA\n<<<END TASK: Main task>>>");
    assert_eq!(
        parts[1],
        "<<<BEGIN FILE: f.py>>>\n```python\nB\n```\n<<<END FILE: f.py>>>"
    );
    assert_eq!(parts[2], "<<<BEGIN URL: u>>>\nC\n<<<END URL: u>>>");
    assert_eq!(parts[3], parts[0]);
}

#[tokio::test]
async fn unreadable_entries_are_skipped_and_logged() {
    let outside = tempfile::tempdir().expect("tempdir");
    std::fs::write(outside.path().join("secret.txt"), "token").expect("write secret");
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("one.py"), "x = 1\n").expect("write");
    std::fs::write(dir.path().join("notes.md"), "plain notes").expect("write");
    let secret = outside.path().join("secret.txt").to_string_lossy().into_owned();

    let request = CompileRequest {
        filepaths: vec![
            "one.py".to_owned(),
            "missing.py".to_owned(),
            secret.clone(),
            "notes.md".to_owned(),
        ],
        urls: vec!["https://gone.example.com".to_owned()],
        workspace_root: Some(dir.path().to_path_buf()),
        ..CompileRequest::default()
    };

    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let sections = compiler(&[]).compile_sections(&request).await;
    let titles = sections
        .iter()
        .map(|section| (section.tag, section.title.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(titles, [(SectionTag::File, "one.py"), (SectionTag::File, "notes.md")]);
    assert_eq!(sections[1].language, None);
    assert!(sections.iter().all(|section| !section.body.contains("token")));

    let logged = logs.contents();
    assert!(logged.contains("skipping unreadable context file"), "{logged}");
    assert!(logged.contains("missing.py"), "{logged}");
    assert!(logged.contains("is outside the workspace"), "{logged}");
    assert!(logged.contains("skipping unreachable context url"), "{logged}");
    assert!(logged.contains("https://gone.example.com"), "{logged}");
}

#[tokio::test]
async fn categories_keep_input_order_despite_arrival_order() {
    let request = CompileRequest {
        supplementary_text: vec!["first note".to_owned(), "second note".to_owned()],
        urls: vec![
            "https://docs.example.com/slow".to_owned(),
            "https://docs.example.com/fast".to_owned(),
        ],
        ..CompileRequest::default()
    };
    let compiler = compiler(&[
        ("https://docs.example.com/slow", "slow page"),
        ("https://docs.example.com/fast", "fast page"),
    ]);

    let sections = compiler.compile_sections(&request).await;
    assert_eq!(sections.len(), 3);
    assert_eq!(sections[0].tag, SectionTag::Context);
    assert_eq!(sections[0].body, "first note\n\nsecond note");
    assert_eq!(sections[1].body, "slow page");
    assert_eq!(sections[2].body, "fast page");
}

#[tokio::test]
async fn empty_request_compiles_to_empty_document() {
    let request = CompileRequest::default();
    assert!(request.is_empty());
    assert_eq!(compiler(&[]).compile(&request).await, "");
}
