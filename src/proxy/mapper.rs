// Registry payload -> CompanyRecord projection.
// Missing nested fields become None / empty lists; nothing here fails.

use serde_json::Value;

use super::models::{
    Activity, Address, CompanyRecord, Contacts, Member, RawCompany, RawDescribed,
    RawEstablishment, SimplesStatus, StateRegistration,
};

pub const MAX_SECONDARY_ACTIVITIES: usize = 20;
pub const MAX_STATE_REGISTRATIONS: usize = 10;
pub const MAX_MEMBERS: usize = 50;

/// Convert the registry payload into the internal record.
pub fn map_company(raw: &RawCompany) -> CompanyRecord {
    let empty = RawEstablishment::default();
    let est = raw.estabelecimento.as_ref().unwrap_or(&empty);

    let tax_id = est.cnpj.as_deref().map(crate::cnpj::clean).unwrap_or_default();
    let tax_id_formatted = crate::cnpj::format(&tax_id);

    CompanyRecord {
        tax_id,
        tax_id_formatted,
        legal_name: non_blank(&raw.razao_social),
        trade_name: non_blank(&est.nome_fantasia),
        status: non_blank(&est.situacao_cadastral),
        status_date: non_blank(&est.data_situacao_cadastral),
        opened_on: non_blank(&est.data_inicio_atividade),
        legal_nature: described(&raw.natureza_juridica),
        company_size: described(&raw.porte),
        share_capital: raw.capital_social.as_ref().map(parse_capital).unwrap_or(0.0),
        address: map_address(est),
        contacts: map_contacts(est),
        main_activity: est.atividade_principal.as_ref().map(map_activity),
        secondary_activities: est
            .atividades_secundarias
            .iter()
            .flatten()
            .take(MAX_SECONDARY_ACTIVITIES)
            .map(map_activity)
            .collect(),
        state_registrations: est
            .inscricoes_estaduais
            .iter()
            .flatten()
            .filter_map(|reg| {
                let number = non_blank(&reg.inscricao_estadual)?;
                Some(StateRegistration {
                    number,
                    state: reg.estado.as_ref().and_then(|s| non_blank(&s.sigla)),
                    active: reg.ativo.unwrap_or(false),
                })
            })
            .take(MAX_STATE_REGISTRATIONS)
            .collect(),
        members: raw
            .socios
            .iter()
            .flatten()
            .filter_map(|partner| {
                let name = non_blank(&partner.nome)?;
                Some(Member {
                    name,
                    role: described(&partner.qualificacao_socio),
                    since: non_blank(&partner.data_entrada),
                })
            })
            .take(MAX_MEMBERS)
            .collect(),
        simples: raw.simples.as_ref().map(|s| SimplesStatus {
            optant: is_yes(&s.simples),
            mei: is_yes(&s.mei),
        }),
    }
}

fn map_address(est: &RawEstablishment) -> Address {
    let street = match (non_blank(&est.tipo_logradouro), non_blank(&est.logradouro)) {
        (Some(kind), Some(name)) => Some(format!("{} {}", kind, name)),
        (None, Some(name)) => Some(name),
        _ => None,
    };

    Address {
        street,
        number: non_blank(&est.numero),
        complement: non_blank(&est.complemento),
        district: non_blank(&est.bairro),
        city: est.cidade.as_ref().and_then(|c| non_blank(&c.nome)),
        state: est.estado.as_ref().and_then(|s| non_blank(&s.sigla)),
        zip_code: non_blank(&est.cep),
    }
}

fn map_contacts(est: &RawEstablishment) -> Contacts {
    let phones = [(&est.ddd1, &est.telefone1), (&est.ddd2, &est.telefone2)]
        .into_iter()
        .filter_map(|(ddd, number)| {
            let number = non_blank(number)?;
            Some(match non_blank(ddd) {
                Some(ddd) => format!("({}) {}", ddd, number),
                None => number,
            })
        })
        .collect();

    Contacts {
        phones,
        email: non_blank(&est.email).map(|e| e.to_lowercase()),
    }
}

fn map_activity(raw: &RawDescribed) -> Activity {
    let code = match &raw.id {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    Activity {
        code,
        description: non_blank(&raw.descricao),
    }
}

/// Parse the registry's share capital. Numbers pass through; strings like
/// `"R$ 1.234,56"` become `1234.56`; anything unparseable is 0.
pub fn parse_capital(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_currency(s),
        _ => 0.0,
    }
}

pub fn parse_currency(raw: &str) -> f64 {
    let normalized: String = raw
        .replace("R$", "")
        .trim()
        .chars()
        .filter(|c| *c != '.' && !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    normalized.parse::<f64>().unwrap_or(0.0)
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn described(value: &Option<RawDescribed>) -> Option<String> {
    value.as_ref().and_then(|d| non_blank(&d.descricao))
}

fn is_yes(value: &Option<String>) -> bool {
    value
        .as_deref()
        .map(|v| v.trim().eq_ignore_ascii_case("sim"))
        .unwrap_or(false)
}
