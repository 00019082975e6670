use std::sync::Arc;

use stockbill_infra::config::{BillingConfig, InventoryConfig};
use stockbill_infra::gateway::{GatewayError, HttpInventoryClient, InventoryGateway};
use stockbill_infra::inventory_service::InventoryService;
use stockbill_infra::invoice_authority::InvoiceAuthority;
use stockbill_infra::invoice_store::InMemoryInvoiceStore;
use stockbill_infra::ledger::InMemoryBalanceLedger;

/// Inventory surface wiring: one in-memory ledger behind the service.
#[derive(Debug)]
pub struct InventoryServices {
    pub inventory: Arc<InventoryService<InMemoryBalanceLedger>>,
}

impl InventoryServices {
    pub fn in_memory() -> Self {
        Self {
            inventory: Arc::new(InventoryService::new(InMemoryBalanceLedger::new())),
        }
    }

    pub fn from_config(config: &InventoryConfig) -> Self {
        Self {
            inventory: Arc::new(InventoryService::with_journal_capacity(
                InMemoryBalanceLedger::new(),
                config.journal_capacity,
            )),
        }
    }
}

impl Default for InventoryServices {
    fn default() -> Self {
        Self::in_memory()
    }
}

pub type Authority = InvoiceAuthority<InMemoryInvoiceStore, Arc<dyn InventoryGateway>>;

/// Billing surface wiring: in-memory invoice store plus any inventory gateway.
pub struct BillingServices {
    pub authority: Authority,
}

impl BillingServices {
    pub fn with_gateway(gateway: Arc<dyn InventoryGateway>) -> Self {
        Self {
            authority: InvoiceAuthority::new(InMemoryInvoiceStore::new(), gateway),
        }
    }

    /// Talk to a remote inventory service over HTTP, as configured.
    pub fn from_config(config: &BillingConfig) -> Result<Self, GatewayError> {
        let client = HttpInventoryClient::with_timeout(config.inventory_url.clone(), config.inventory_timeout)?;
        Ok(Self::with_gateway(Arc::new(client)))
    }
}
