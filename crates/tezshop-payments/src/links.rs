//! Redirect links to the providers' hosted payment forms.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use tezshop_core::money::to_tiyin;
use tezshop_core::Settings;

/// Payme checkout form: `{PAYME_URL}/{base64("m=<id>;ac.<field>=<order>;a=<tiyin>")}`.
/// The amount parameter is in tiyin.
pub fn payme_checkout_url(settings: &Settings, order_id: i64, amount_sum: i64) -> String {
    let params = format!(
        "m={};ac.{}={};a={}",
        settings.payme_id,
        settings.payme_account_field,
        order_id,
        to_tiyin(amount_sum)
    );
    format!("{}/{}", settings.payme_url, STANDARD.encode(params))
}

/// Click checkout form; the amount parameter stays in sum.
pub fn click_checkout_url(settings: &Settings, order_id: i64, amount_sum: i64) -> String {
    format!(
        "https://my.click.uz/services/pay?service_id={}&merchant_id={}&amount={}&transaction_param={}",
        settings.click_service_id, settings.click_merchant_id, amount_sum, order_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tezshop_test_utils::fixtures::test_settings;

    #[test]
    fn payme_link_encodes_account_and_tiyin_amount() {
        let settings = test_settings();
        let url = payme_checkout_url(&settings, 5, 15_000);
        let encoded = url.rsplit('/').next().unwrap();
        let decoded = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded, format!("m={};ac.order_id=5;a=1500000", settings.payme_id));
        assert!(url.starts_with(&settings.payme_url));
    }

    #[test]
    fn click_link_keeps_amount_in_sum() {
        let settings = test_settings();
        let url = click_checkout_url(&settings, 7, 20_000);
        assert!(url.contains("amount=20000"));
        assert!(url.contains("transaction_param=7"));
        assert!(url.contains(&format!("service_id={}", settings.click_service_id)));
    }
}
