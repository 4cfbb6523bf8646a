//! Typed clients for the stage services
//!
//! The orchestrator and scheduler depend on the `*Api` traits, not on
//! concrete transports, so tests can substitute stubs. The HTTP
//! implementations decode [`ErrorBody`] payloads back into the taxonomy;
//! transport failures classify as `Unavailable` or `Unknown`.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

use quotepipe_core::{
    BarSeries, CachedRecord, ErrorBody, ItemOutcome, PersistResult, PipelineError, PipelineResult,
    RawQuote, TransformedQuote,
};

use crate::storage::QuoteStore;
use crate::wire::{
    BarsRequest, BulkProcessRequest, BulkProcessResponse, BulkQuoteRequest, BulkQuoteResponse,
    BulkTransformRequest, BulkTransformResponse, ProcessRequest, QuoteRequest, SymbolsResponse,
    TransformRequest,
};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch stage as seen by callers.
#[async_trait]
pub trait MarketDataApi: Send + Sync {
    async fn fetch(&self, symbol: &str) -> PipelineResult<RawQuote>;
    async fn bulk_fetch(&self, symbols: &[String]) -> PipelineResult<Vec<ItemOutcome<RawQuote>>>;
    async fn historical_bars(&self, request: &BarsRequest) -> PipelineResult<BarSeries>;
}

/// Transform stage as seen by callers.
#[async_trait]
pub trait TransformerApi: Send + Sync {
    async fn transform(&self, raw: &RawQuote) -> PipelineResult<TransformedQuote>;
    async fn bulk_transform(
        &self,
        raw: &[RawQuote],
    ) -> PipelineResult<Vec<ItemOutcome<TransformedQuote>>>;
}

/// Persistence stage as seen by callers.
#[async_trait]
pub trait PersistenceApi: Send + Sync {
    async fn process(&self, quote: &TransformedQuote) -> PipelineResult<PersistResult>;
    async fn bulk_process(
        &self,
        quotes: &[TransformedQuote],
    ) -> PipelineResult<Vec<PersistResult>>;
}

fn build_client(base_url: &str) -> PipelineResult<(Client, Url)> {
    let http = Client::builder()
        .timeout(CLIENT_TIMEOUT)
        .build()
        .map_err(PipelineError::from)?;
    let base = Url::parse(base_url).map_err(|e| {
        PipelineError::InvalidArgument(format!("invalid service url {:?}: {}", base_url, e))
    })?;
    Ok((http, base))
}

fn join_url(base: &Url, path: &str) -> PipelineResult<Url> {
    base.join(path)
        .map_err(|e| PipelineError::Internal(format!("failed to build url {:?}: {}", path, e)))
}

async fn post_json<Req: Serialize, Resp: DeserializeOwned>(
    http: &Client,
    url: Url,
    body: &Req,
) -> PipelineResult<Resp> {
    let response = http
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(PipelineError::from)?;
    decode_response(response).await
}

async fn get_json<Resp: DeserializeOwned>(http: &Client, url: Url) -> PipelineResult<Resp> {
    let response = http.get(url).send().await.map_err(PipelineError::from)?;
    decode_response(response).await
}

/// Decode a success body, or an [`ErrorBody`] back into the taxonomy.
async fn decode_response<Resp: DeserializeOwned>(
    response: reqwest::Response,
) -> PipelineResult<Resp> {
    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return response.json().await.map_err(PipelineError::from);
    }

    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => Err(body.into()),
        Err(_) => Err(PipelineError::from_status(
            status,
            format!("service returned {}: {}", status, text),
        )),
    }
}

/// HTTP client for the market data service.
pub struct MarketDataClient {
    http: Client,
    base: Url,
}

impl MarketDataClient {
    pub fn new(base_url: &str) -> PipelineResult<Self> {
        let (http, base) = build_client(base_url)?;
        Ok(Self { http, base })
    }
}

#[async_trait]
impl MarketDataApi for MarketDataClient {
    async fn fetch(&self, symbol: &str) -> PipelineResult<RawQuote> {
        let url = join_url(&self.base, "/v1/quote")?;
        post_json(
            &self.http,
            url,
            &QuoteRequest {
                symbol: symbol.to_string(),
            },
        )
        .await
    }

    async fn bulk_fetch(&self, symbols: &[String]) -> PipelineResult<Vec<ItemOutcome<RawQuote>>> {
        let url = join_url(&self.base, "/v1/quotes/bulk")?;
        let response: BulkQuoteResponse = post_json(
            &self.http,
            url,
            &BulkQuoteRequest {
                symbols: symbols.to_vec(),
            },
        )
        .await?;
        Ok(response.results)
    }

    async fn historical_bars(&self, request: &BarsRequest) -> PipelineResult<BarSeries> {
        let url = join_url(&self.base, "/v1/bars")?;
        post_json(&self.http, url, request).await
    }
}

/// HTTP client for the transformer service.
pub struct TransformerClient {
    http: Client,
    base: Url,
}

impl TransformerClient {
    pub fn new(base_url: &str) -> PipelineResult<Self> {
        let (http, base) = build_client(base_url)?;
        Ok(Self { http, base })
    }
}

#[async_trait]
impl TransformerApi for TransformerClient {
    async fn transform(&self, raw: &RawQuote) -> PipelineResult<TransformedQuote> {
        let url = join_url(&self.base, "/v1/transform")?;
        post_json(
            &self.http,
            url,
            &TransformRequest {
                raw_quote: raw.clone(),
            },
        )
        .await
    }

    async fn bulk_transform(
        &self,
        raw: &[RawQuote],
    ) -> PipelineResult<Vec<ItemOutcome<TransformedQuote>>> {
        let url = join_url(&self.base, "/v1/transform/bulk")?;
        let response: BulkTransformResponse = post_json(
            &self.http,
            url,
            &BulkTransformRequest {
                raw_quotes: raw.to_vec(),
            },
        )
        .await?;
        Ok(response.results)
    }
}

/// HTTP client for the persistence service.
pub struct PersistenceClient {
    http: Client,
    base: Url,
}

impl PersistenceClient {
    pub fn new(base_url: &str) -> PipelineResult<Self> {
        let (http, base) = build_client(base_url)?;
        Ok(Self { http, base })
    }
}

#[async_trait]
impl PersistenceApi for PersistenceClient {
    async fn process(&self, quote: &TransformedQuote) -> PipelineResult<PersistResult> {
        let url = join_url(&self.base, "/v1/process")?;
        post_json(
            &self.http,
            url,
            &ProcessRequest {
                quote: quote.clone(),
            },
        )
        .await
    }

    async fn bulk_process(
        &self,
        quotes: &[TransformedQuote],
    ) -> PipelineResult<Vec<PersistResult>> {
        let url = join_url(&self.base, "/v1/process/bulk")?;
        let response: BulkProcessResponse = post_json(
            &self.http,
            url,
            &BulkProcessRequest {
                quotes: quotes.to_vec(),
            },
        )
        .await?;
        Ok(response.results)
    }
}

/// [`QuoteStore`] view over a remote persistence service, for schedulers
/// running outside the persistence process.
pub struct RemoteQuoteStore {
    http: Client,
    base: Url,
}

impl RemoteQuoteStore {
    pub fn new(base_url: &str) -> PipelineResult<Self> {
        let (http, base) = build_client(base_url)?;
        Ok(Self { http, base })
    }
}

#[async_trait]
impl QuoteStore for RemoteQuoteStore {
    async fn distinct_symbols(&self) -> PipelineResult<Vec<String>> {
        let url = join_url(&self.base, "/v1/symbols")?;
        let response: SymbolsResponse = get_json(&self.http, url).await?;
        Ok(response.symbols)
    }

    async fn record(&self, symbol: &str) -> PipelineResult<Option<CachedRecord>> {
        let url = join_url(&self.base, &format!("/v1/records/{}", symbol))?;
        match get_json::<CachedRecord>(&self.http, url).await {
            Ok(record) => Ok(Some(record)),
            Err(PipelineError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn upsert(&self, quote: &TransformedQuote) -> PipelineResult<()> {
        let url = join_url(&self.base, "/v1/process")?;
        let result: PersistResult = post_json(
            &self.http,
            url,
            &ProcessRequest {
                quote: quote.clone(),
            },
        )
        .await?;
        if result.success {
            Ok(())
        } else {
            Err(PipelineError::Internal(result.message))
        }
    }
}
