use alloy_primitives::{Address, Bytes, B256, U256, U64};
use alloy_rpc_client::{ClientBuilder, RpcClient};
use alloy_rpc_types::{BlockNumberOrTag, Filter, Log, TransactionRequest};
use alloy_transport::{RpcError, TransportError, TransportErrorKind};
use tracing::{debug, warn};

use denuncia_core::{LedgerError, LedgerReader, LedgerRecordRef, LedgerSettings};

use crate::abi;

/// JSON-RPC error code some providers use for "limit exceeded"
const LIMIT_EXCEEDED: i64 = -32005;

/// Map a transport failure onto the ledger error taxonomy
pub fn classify(err: TransportError) -> LedgerError {
    match &err {
        RpcError::Transport(TransportErrorKind::HttpError(http)) if http.status == 429 => {
            LedgerError::RateLimited(format!("HTTP 429: {}", http.body))
        }
        RpcError::ErrorResp(payload) => {
            let message = payload.message.to_string();
            let lowered = message.to_lowercase();
            if payload.code == 429
                || payload.code == LIMIT_EXCEEDED
                || lowered.contains("rate limit")
                || lowered.contains("too many requests")
            {
                LedgerError::RateLimited(message)
            } else {
                LedgerError::Rpc(format!("{} (code {})", message, payload.code))
            }
        }
        RpcError::DeserError { .. } | RpcError::NullResp => LedgerError::Decode(err.to_string()),
        _ => LedgerError::Unavailable(err.to_string()),
    }
}

/// Reads the record index contract over JSON-RPC
pub struct LedgerRpcClient {
    client: RpcClient,
    contract: Address,
    total_selector: [u8; 4],
    record_selector: [u8; 4],
    event_topic: B256,
}

impl LedgerRpcClient {
    pub async fn connect(settings: &LedgerSettings) -> Result<Self, LedgerError> {
        let contract: Address = settings.contract_address.parse().map_err(|e| {
            LedgerError::Unavailable(format!(
                "invalid contract address {:?}: {}",
                settings.contract_address, e
            ))
        })?;
        let client = ClientBuilder::default()
            .connect(&settings.rpc_url)
            .await
            .map_err(classify)?;
        debug!(rpc_url = %settings.rpc_url, contract = %contract, "Connected to ledger");
        Ok(Self::with_client(client, contract, settings))
    }

    pub fn with_client(client: RpcClient, contract: Address, settings: &LedgerSettings) -> Self {
        Self {
            client,
            contract,
            total_selector: abi::selector(&settings.total_signature),
            record_selector: abi::selector(&settings.record_signature),
            event_topic: abi::event_topic(&settings.event_signature),
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    async fn call(&self, calldata: Vec<u8>) -> Result<Bytes, LedgerError> {
        let tx = TransactionRequest::default()
            .to(self.contract)
            .input(calldata.into());
        self.client
            .request("eth_call", (tx, BlockNumberOrTag::Latest))
            .await
            .map_err(classify)
    }
}

impl LedgerReader for LedgerRpcClient {
    async fn total_records(&self) -> Result<u64, LedgerError> {
        let data = self.call(abi::encode_call(self.total_selector, &[])).await?;
        // A contract with nothing deployed at the address answers "0x"
        let total = abi::decode_u64(&data, 0)?;
        debug!(total, "Ledger record count");
        Ok(total)
    }

    async fn record_at(&self, index: u64) -> Result<LedgerRecordRef, LedgerError> {
        let calldata = abi::encode_call(self.record_selector, &[U256::from(index)]);
        let data = self.call(calldata).await?;
        abi::decode_record(index, &data)
    }

    async fn record_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LedgerRecordRef>, LedgerError> {
        let filter = Filter::new()
            .address(self.contract)
            .event_signature(self.event_topic)
            .from_block(from_block)
            .to_block(to_block);

        let logs: Vec<Log> = self
            .client
            .request("eth_getLogs", (filter,))
            .await
            .map_err(classify)?;

        let records = logs
            .iter()
            .filter_map(|log| {
                match abi::decode_created_event(log.topics(), &log.data().data) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(block = ?log.block_number, error = %e, "Skipping undecodable event");
                        None
                    }
                }
            })
            .collect::<Vec<_>>();

        debug!(from_block, to_block, logs = logs.len(), records = records.len(), "Fetched record events");
        Ok(records)
    }

    async fn head_block(&self) -> Result<u64, LedgerError> {
        let block: U64 = self
            .client
            .request_noparams("eth_blockNumber")
            .await
            .map_err(classify)?;
        Ok(block.to::<u64>())
    }
}
