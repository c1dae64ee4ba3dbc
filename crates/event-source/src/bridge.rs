use crate::EventSource;
use crate::error::SourceError;
use crate::responses::{BridgeDeal, HistoryRequest, LoginRequest, SuccessResponse};
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use configuration::{AccountSettings, SourceSettings};
use core_types::{AccountId, LedgerEvent};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct Credentials {
    password: String,
    server: String,
}

/// Reads ledgers through the HTTP bridge in front of the trading terminal.
///
/// The terminal holds one logged-in account at a time, so a login followed by
/// a history request is serialized behind `active_account`.
pub struct BridgeClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    history_from: DateTime<Utc>,
    credentials: HashMap<AccountId, Credentials>,
    active_account: Mutex<Option<AccountId>>,
}

impl BridgeClient {
    pub fn new(settings: &SourceSettings, accounts: &[AccountSettings]) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;

        let credentials = accounts
            .iter()
            .filter_map(|account| {
                let password = account.password.clone()?;
                let server = account.server.clone()?;
                Some((account.id, Credentials { password, server }))
            })
            .collect();

        Ok(Self {
            client,
            base_url: settings.bridge_url.trim_end_matches('/').to_string(),
            timeout: settings.timeout(),
            history_from: settings.history_from.and_time(NaiveTime::MIN).and_utc(),
            credentials,
            active_account: Mutex::new(None),
        })
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| SourceError::from_request(e, self.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SourceError::from_request(e, self.timeout))?;

        if status.is_success() {
            serde_json::from_str::<T>(&text).map_err(|e| SourceError::Deserialization(e.to_string()))
        } else {
            Err(SourceError::Unavailable(format!("{path} returned {status}: {text}")))
        }
    }

    /// Switches the terminal to `account_id` unless it is already active.
    ///
    /// Accounts without configured credentials are assumed to be the account
    /// the terminal is already logged into.
    async fn ensure_login(&self, active: &mut Option<AccountId>, account_id: AccountId) -> Result<(), SourceError> {
        if *active == Some(account_id) {
            return Ok(());
        }
        let Some(credentials) = self.credentials.get(&account_id) else {
            *active = Some(account_id);
            return Ok(());
        };

        *active = None;
        let request = LoginRequest {
            login: account_id,
            password: &credentials.password,
            server: &credentials.server,
        };
        let response: SuccessResponse = self.post("/login", &request).await?;
        if !response.success {
            return Err(SourceError::Unavailable(format!("login to account {account_id} was refused")));
        }

        tracing::info!(account_id, server = %credentials.server, "Bridge switched account.");
        *active = Some(account_id);
        Ok(())
    }
}

#[async_trait]
impl EventSource for BridgeClient {
    async fn list_events(
        &self,
        account_id: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEvent>, SourceError> {
        let mut active = self.active_account.lock().await;
        self.ensure_login(&mut active, account_id).await?;

        let request = HistoryRequest {
            date_from: from.to_rfc3339(),
            date_to: to.to_rfc3339(),
        };
        let deals: Vec<BridgeDeal> = self.post("/history_deals", &request).await?;
        drop(active);

        let received = deals.len();
        let events = deals
            .into_iter()
            .map(|deal| deal.into_event(account_id))
            .filter_map(Result::transpose)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(account_id, received, events = events.len(), "Fetched history deals.");
        Ok(events)
    }

    async fn latest_event_id(&self, account_id: AccountId) -> Result<Option<i64>, SourceError> {
        let events = self.list_events(account_id, self.history_from, Utc::now()).await?;
        Ok(events.iter().map(|e| e.id).max())
    }
}
