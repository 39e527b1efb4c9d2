use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use linecomp_context::{
    BackendClient, BackendError, CompletionService, ContextCompiler, InProcessCompletionService,
    ReferenceFinder, ServiceError, SymbolSourceFetcher,
};
use linecomp_core::protocol::{
    SuggestRequest, SuggestResponse, SymbolLocationsRequest, SymbolLocationsResponse,
    SymbolSourceRequest, SymbolSourceResponse,
};
use linecomp_core::{ContextItem, SymbolImplementationLocation, SymbolReference, SymbolSource};
use linecomp_infer::{
    CompletionPrompt, CompletionProvider, FetchError, InferError, MockProvider, UrlReader,
};

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

async fn suggest(Json(request): Json<SuggestRequest>) -> Json<SuggestResponse> {
    Json(SuggestResponse {
        response: vec![format!("# {} symbols", request.symbol_implementations.len())],
    })
}

async fn symbol_locations(
    Json(request): Json<SymbolLocationsRequest>,
) -> Json<SymbolLocationsResponse> {
    Json(SymbolLocationsResponse {
        references: (request.start_line..request.end_line)
            .map(|line| SymbolReference::new(format!("{}_{line}", request.path), line, 0))
            .collect(),
    })
}

async fn symbol_source(Json(request): Json<SymbolSourceRequest>) -> Json<SymbolSourceResponse> {
    Json(SymbolSourceResponse {
        sources: request
            .locations
            .into_iter()
            .map(|location| SymbolSource {
                text: format!("def {}(): ...", location.name),
                name: location.name,
                path: location.path,
                start_line: location.start_line,
                start_col: location.start_col,
            })
            .collect(),
    })
}

fn location(name: &str) -> SymbolImplementationLocation {
    SymbolImplementationLocation {
        name: name.to_owned(),
        path: "lib.py".to_owned(),
        start_line: 4,
        start_col: 0,
        end_line: 6,
        end_col: 0,
        expand_to_class: false,
    }
}

#[tokio::test]
async fn backend_client_speaks_the_three_operations() {
    let base = spawn(
        Router::new()
            .route("/suggest", post(suggest))
            .route("/symbol_locations", post(symbol_locations))
            .route("/symbol_source", post(symbol_source)),
    )
    .await;
    let client = BackendClient::new(format!("{base}/"), Duration::from_secs(5));

    let references = client.find_references("app.py", 2, 4).await.expect("references");
    assert_eq!(
        references,
        vec![
            SymbolReference::new("app.py_2", 2, 0),
            SymbolReference::new("app.py_3", 3, 0),
        ]
    );

    let sources = client
        .fetch_sources(&[location("parse"), location("render")])
        .await
        .expect("sources");
    let texts = sources
        .iter()
        .map(|source| source.text.as_str())
        .collect::<Vec<_>>();
    assert_eq!(texts, ["def parse(): ...", "def render(): ..."]);

    let request = SuggestRequest {
        close_context: "x = /*@@*/".to_owned(),
        symbol_implementations: sources,
        ..SuggestRequest::default()
    };
    let candidates = CompletionService::suggest(&client, &request)
        .await
        .expect("suggest");
    assert_eq!(candidates, vec!["# 2 symbols".to_owned()]);
}

#[tokio::test]
async fn backend_errors_carry_status_and_body() {
    let base = spawn(Router::new().route(
        "/suggest",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "model overloaded") }),
    ))
    .await;
    let client = BackendClient::new(base, Duration::from_secs(5));

    let err = client
        .suggest(&SuggestRequest {
            close_context: "y".to_owned(),
            ..SuggestRequest::default()
        })
        .await
        .expect_err("status error");
    match err {
        BackendError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "model overloaded");
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = client
        .find_references("app.py", 0, 1)
        .await
        .expect_err("missing route");
    assert!(err.to_string().contains("404"), "{err}");
}

struct CapturingProvider {
    prompts: Mutex<Vec<CompletionPrompt>>,
}

#[async_trait]
impl CompletionProvider for CapturingProvider {
    async fn complete(&self, prompt: &CompletionPrompt) -> Result<Vec<String>, InferError> {
        self.prompts.lock().expect("lock").push(prompt.clone());
        Ok(vec!["return total".to_owned()])
    }
}

struct StaticReader;

#[async_trait]
impl UrlReader for StaticReader {
    async fn read(&self, url: &str) -> Result<String, FetchError> {
        Ok(format!("rendered {url}"))
    }
}

#[tokio::test]
async fn in_process_service_renders_compiled_context() {
    let provider = Arc::new(CapturingProvider {
        prompts: Mutex::new(Vec::new()),
    });
    let service = InProcessCompletionService::new(
        provider.clone(),
        ContextCompiler::new(Arc::new(StaticReader)),
        "/*@@*/",
        None,
    );

    let request = SuggestRequest {
        close_context: "def total(items):\n    /*@@*/".to_owned(),
        symbol_implementations: vec![SymbolSource {
            name: "price".to_owned(),
            path: "shop.py".to_owned(),
            start_line: 9,
            start_col: 0,
            text: "def price(item):\n    return item.cost".to_owned(),
        }],
        primary_context: Some(ContextItem::text("sum item prices")),
        user_context: vec![ContextItem::url("https://docs.example.com")],
        web_search_enabled: false,
    };
    let candidates = service.suggest(&request).await.expect("suggest");
    assert_eq!(candidates, vec!["return total".to_owned()]);

    let prompts = provider.prompts.lock().expect("lock").clone();
    assert_eq!(prompts.len(), 1);
    let document = &prompts[0].document;
    let task = document.find("<<<BEGIN TASK: Main task>>>").expect("task");
    let url = document
        .find("rendered https://docs.example.com")
        .expect("url section");
    let symbol = document
        .find("<<<BEGIN SYMBOL: price (shop.py:10)>>>")
        .expect("symbol section");
    let code = document.find("Code:\n```python\n").expect("code");
    assert!(task < url && url < symbol && symbol < code);
    assert_eq!(prompts[0].split_at_marker().0, "def total(items):\n    ");
}

#[tokio::test]
async fn in_process_service_rejects_blank_code() {
    let service = InProcessCompletionService::new(
        Arc::new(MockProvider),
        ContextCompiler::new(Arc::new(StaticReader)),
        "/*@@*/",
        None,
    );
    let err = service
        .suggest(&SuggestRequest::default())
        .await
        .expect_err("invalid");
    assert!(matches!(err, ServiceError::Invalid(_)));

    let candidates = service
        .suggest(&SuggestRequest {
            close_context: "x = /*@@*/".to_owned(),
            ..SuggestRequest::default()
        })
        .await
        .expect("mock");
    assert_eq!(candidates.len(), 3);
}
