use crate::domain::currency::{CurrencyCode, Rate};
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Registration request as submitted by a webhook owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubscription {
    #[serde(rename = "webhookURL", alias = "webhookurl", alias = "webhookUrl")]
    pub webhook_url: String,
    #[serde(rename = "baseCurrency")]
    pub base_currency: String,
    #[serde(rename = "targetCurrency")]
    pub target_currency: String,
    #[serde(rename = "minTriggerValue")]
    pub min_trigger: Rate,
    #[serde(rename = "maxTriggerValue")]
    pub max_trigger: Rate,
}

/// A registration that passed validation and can be handed to storage.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookRegistration {
    pub webhook_url: String,
    pub base_currency: CurrencyCode,
    pub target_currency: CurrencyCode,
    pub min_trigger: Rate,
    pub max_trigger: Rate,
}

/// A stored webhook subscription. The id is assigned by storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    #[serde(rename = "webhookURL")]
    pub webhook_url: String,
    #[serde(rename = "baseCurrency")]
    pub base_currency: CurrencyCode,
    #[serde(rename = "targetCurrency")]
    pub target_currency: CurrencyCode,
    #[serde(rename = "minTriggerValue")]
    pub min_trigger: Rate,
    #[serde(rename = "maxTriggerValue")]
    pub max_trigger: Rate,
}

/// JSON body POSTed to a subscriber whose trigger band matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub base_currency: CurrencyCode,
    pub target_currency: CurrencyCode,
    pub current_rate: Rate,
    #[serde(rename = "minTriggerValue")]
    pub min_trigger: Rate,
    #[serde(rename = "maxTriggerValue")]
    pub max_trigger: Rate,
}

impl NewSubscription {
    pub fn validate(
        self,
        supported_bases: &[CurrencyCode],
    ) -> Result<WebhookRegistration, ValidationError> {
        let base_currency: CurrencyCode = self.base_currency.parse()?;
        if !supported_bases.contains(&base_currency) {
            let supported = supported_bases
                .iter()
                .map(CurrencyCode::as_str)
                .collect::<Vec<_>>()
                .join(",");
            return Err(ValidationError::UnsupportedBase {
                base: base_currency.to_string(),
                supported,
            });
        }
        let target_currency: CurrencyCode = self.target_currency.parse()?;

        let webhook_url = self.webhook_url.trim().to_string();
        match reqwest::Url::parse(&webhook_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
            _ => return Err(ValidationError::InvalidUrl(self.webhook_url)),
        }

        if !self.min_trigger.is_finite() || !self.max_trigger.is_finite() {
            return Err(ValidationError::NonFiniteTrigger);
        }
        if self.min_trigger > self.max_trigger {
            return Err(ValidationError::InvertedBand {
                min: self.min_trigger,
                max: self.max_trigger,
            });
        }

        Ok(WebhookRegistration {
            webhook_url,
            base_currency,
            target_currency,
            min_trigger: self.min_trigger,
            max_trigger: self.max_trigger,
        })
    }
}

impl Subscription {
    pub fn from_registration(id: String, reg: WebhookRegistration) -> Self {
        Self {
            id,
            webhook_url: reg.webhook_url,
            base_currency: reg.base_currency,
            target_currency: reg.target_currency,
            min_trigger: reg.min_trigger,
            max_trigger: reg.max_trigger,
        }
    }

    /// Inclusive trigger band check.
    pub fn in_band(&self, rate: Rate) -> bool {
        self.min_trigger <= rate && rate <= self.max_trigger
    }

    pub fn payload(&self, current_rate: Rate) -> WebhookPayload {
        WebhookPayload {
            base_currency: self.base_currency.clone(),
            target_currency: self.target_currency.clone(),
            current_rate,
            min_trigger: self.min_trigger,
            max_trigger: self.max_trigger,
        }
    }
}
