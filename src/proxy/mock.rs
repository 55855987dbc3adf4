//! Scriptable registry client for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::client::{RegistryClient, RegistryError};
use super::models::RawCompany;
use crate::cnpj::Cnpj;

/// Answers from a script of queued results, then with a well-formed company
/// for whatever CNPJ was asked. Counts every call.
#[derive(Debug, Default)]
pub struct MockRegistry {
    calls: AtomicUsize,
    script: Mutex<VecDeque<Result<Value, RegistryError>>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: Vec<Result<Value, RegistryError>>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(script.into()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn company_payload(cnpj: &str) -> Value {
        json!({
            "razao_social": format!("EMPRESA {}", cnpj),
            "capital_social": "R$ 10.000,00",
            "estabelecimento": {
                "cnpj": cnpj,
                "situacao_cadastral": "Ativa",
                "cidade": { "nome": "Curitiba" },
                "estado": { "sigla": "PR" }
            }
        })
    }
}

#[async_trait]
impl RegistryClient for MockRegistry {
    async fn fetch(&self, cnpj: &Cnpj) -> Result<RawCompany, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self.script.lock().expect("script mutex poisoned").pop_front();
        let payload = match scripted {
            Some(result) => result?,
            None => Self::company_payload(cnpj.as_str()),
        };

        serde_json::from_value(payload).map_err(|e| RegistryError::Decode(e.to_string()))
    }
}
