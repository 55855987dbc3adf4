use serde::{Deserialize, Serialize};
use serde_json::Value;

// ===== Upstream registry payload =====
//
// Every field is optional: the registry omits or nulls fields freely and the
// mapper decides the defaults.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCompany {
    pub razao_social: Option<String>,
    /// Number or localized string ("R$ 1.000,00")
    pub capital_social: Option<Value>,
    pub porte: Option<RawDescribed>,
    pub natureza_juridica: Option<RawDescribed>,
    pub simples: Option<RawSimples>,
    pub socios: Option<Vec<RawPartner>>,
    pub estabelecimento: Option<RawEstablishment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawDescribed {
    pub id: Option<Value>,
    pub descricao: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSimples {
    pub simples: Option<String>,
    pub mei: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPartner {
    pub nome: Option<String>,
    pub qualificacao_socio: Option<RawDescribed>,
    pub data_entrada: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawEstablishment {
    pub cnpj: Option<String>,
    pub nome_fantasia: Option<String>,
    pub situacao_cadastral: Option<String>,
    pub data_situacao_cadastral: Option<String>,
    pub data_inicio_atividade: Option<String>,
    pub tipo_logradouro: Option<String>,
    pub logradouro: Option<String>,
    pub numero: Option<String>,
    pub complemento: Option<String>,
    pub bairro: Option<String>,
    pub cep: Option<String>,
    pub ddd1: Option<String>,
    pub telefone1: Option<String>,
    pub ddd2: Option<String>,
    pub telefone2: Option<String>,
    pub email: Option<String>,
    pub atividade_principal: Option<RawDescribed>,
    pub atividades_secundarias: Option<Vec<RawDescribed>>,
    pub inscricoes_estaduais: Option<Vec<RawStateRegistration>>,
    pub cidade: Option<RawNamed>,
    pub estado: Option<RawState>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawStateRegistration {
    pub inscricao_estadual: Option<String>,
    pub ativo: Option<bool>,
    pub estado: Option<RawState>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawNamed {
    pub nome: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawState {
    pub sigla: Option<String>,
}

// ===== Internal response schema =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRecord {
    pub tax_id: String,
    pub tax_id_formatted: String,
    pub legal_name: Option<String>,
    pub trade_name: Option<String>,
    pub status: Option<String>,
    pub status_date: Option<String>,
    pub opened_on: Option<String>,
    pub legal_nature: Option<String>,
    pub company_size: Option<String>,
    pub share_capital: f64,
    pub address: Address,
    pub contacts: Contacts,
    pub main_activity: Option<Activity>,
    pub secondary_activities: Vec<Activity>,
    pub state_registrations: Vec<StateRegistration>,
    pub members: Vec<Member>,
    pub simples: Option<SimplesStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contacts {
    pub phones: Vec<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub code: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRegistration {
    pub number: String,
    pub state: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub role: Option<String>,
    pub since: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplesStatus {
    pub optant: bool,
    pub mei: bool,
}

/// Success body: `{error: false, data, cached}`.
#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub error: bool,
    pub data: CompanyRecord,
    pub cached: bool,
}

impl LookupResponse {
    pub fn new(data: CompanyRecord, cached: bool) -> Self {
        Self {
            error: false,
            data,
            cached,
        }
    }
}
