//! TCP + rustls connector shared by every [`crate::HyperFetch`].

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::RootCertStore;

use crate::config::ClientConfig;

/// Trusts the Mozilla roots shipped with `webpki-roots`.
fn tls_config() -> rustls::ClientConfig {
    let roots = webpki_roots::TLS_SERVER_ROOTS.iter().cloned();
    rustls::ClientConfig::builder()
        .with_root_certificates(RootCertStore::from_iter(roots))
        .with_no_client_auth()
}

/// Plain `http` and `https` URLs, HTTP/1.1 or HTTP/2 negotiated by ALPN.
pub(crate) fn https_connector(config: &ClientConfig) -> HttpsConnector<HttpConnector> {
    let mut tcp = HttpConnector::new();
    tcp.enforce_http(false);
    tcp.set_nodelay(true);
    tcp.set_connect_timeout(Some(config.connect_timeout));

    HttpsConnectorBuilder::new()
        .with_tls_config(tls_config())
        .https_or_http()
        .enable_all_versions()
        .wrap_connector(tcp)
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::*;

    #[test]
    fn trusts_the_bundled_roots() {
        let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        check!(!roots.is_empty());
        let _connector = https_connector(&ClientConfig::default());
    }
}
