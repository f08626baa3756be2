//! Deciding whether, and how, an access token goes onto a request

use std::fmt;

use bytes::{BufMut, BytesMut};
use latchkey_tokens::AccessTokenRef;
use predicates::{prelude::*, reflection};
use reqwest::{
    header::{self, HeaderValue, InvalidHeaderValue},
    Request,
};

pub(crate) fn bearer(token: &AccessTokenRef) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut header_value = BytesMut::with_capacity(token.as_str().len() + 7);
    header_value.put_slice(b"Bearer ");
    header_value.put_slice(token.as_str().as_bytes());
    let mut value = HeaderValue::from_maybe_shared(header_value.freeze())?;
    value.set_sensitive(true);
    Ok(value)
}

/// Puts the bearer credential on `req` unless it already carries one
///
/// Returns whether the credential was added.
pub(crate) fn attach(req: &mut Request, token: &AccessTokenRef) -> Result<bool, InvalidHeaderValue> {
    match req.headers_mut().entry(header::AUTHORIZATION) {
        header::Entry::Vacant(entry) => {
            entry.insert(bearer(token)?);
            Ok(true)
        }
        header::Entry::Occupied(_) => Ok(false),
    }
}

/// Only attach an access token if the request is being sent over HTTPS
#[derive(Clone, Copy, Debug)]
pub struct HttpsOnly;

impl Predicate<Request> for HttpsOnly {
    #[inline]
    fn eval(&self, req: &Request) -> bool {
        req.url().scheme() == "https"
    }

    fn find_case(&self, expected: bool, req: &Request) -> Option<reflection::Case> {
        let result = self.eval(req);
        if result != expected {
            Some(
                reflection::Case::new(Some(self), result).add_product(reflection::Product::new(
                    "scheme",
                    req.url().scheme().to_owned(),
                )),
            )
        } else {
            None
        }
    }
}

impl reflection::PredicateReflection for HttpsOnly {}
impl fmt::Display for HttpsOnly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scheme is https")
    }
}

/// Only attach an access token if the request targets the local machine
#[derive(Clone, Copy, Debug)]
pub struct LoopbackHost;

impl Predicate<Request> for LoopbackHost {
    fn eval(&self, req: &Request) -> bool {
        match req.url().host() {
            Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
            Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
            Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
            None => false,
        }
    }

    fn find_case(&self, expected: bool, req: &Request) -> Option<reflection::Case> {
        let result = self.eval(req);
        if result != expected {
            Some(
                reflection::Case::new(Some(self), result).add_product(reflection::Product::new(
                    "host",
                    req.url()
                        .host_str()
                        .unwrap_or("<no host>")
                        .to_owned(),
                )),
            )
        } else {
            None
        }
    }
}

impl reflection::PredicateReflection for LoopbackHost {}
impl fmt::Display for LoopbackHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("host is loopback")
    }
}

/// Attach an access token over HTTPS, or over any scheme to a loopback host
///
/// This is the default rule, allowing plain HTTP against a local development
/// server while keeping the token off the wire elsewhere.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpsOrLoopback;

impl Predicate<Request> for HttpsOrLoopback {
    #[inline]
    fn eval(&self, req: &Request) -> bool {
        HttpsOnly.eval(req) || LoopbackHost.eval(req)
    }

    fn find_case(&self, expected: bool, req: &Request) -> Option<reflection::Case> {
        let result = self.eval(req);
        if result != expected {
            Some(
                reflection::Case::new(Some(self), result)
                    .add_product(reflection::Product::new(
                        "scheme",
                        req.url().scheme().to_owned(),
                    ))
                    .add_product(reflection::Product::new(
                        "host",
                        req.url().host_str().unwrap_or("<no host>").to_owned(),
                    )),
            )
        } else {
            None
        }
    }
}

impl reflection::PredicateReflection for HttpsOrLoopback {}
impl fmt::Display for HttpsOrLoopback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scheme is https or host is loopback")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> Request {
        Request::new(reqwest::Method::GET, url.parse().unwrap())
    }

    #[test]
    fn bearer_value_is_sensitive() {
        let value = bearer(AccessTokenRef::from_static("A1")).unwrap();
        assert_eq!(value.to_str().unwrap(), "Bearer A1");
        assert!(value.is_sensitive());
    }

    #[test]
    fn token_with_newline_is_rejected() {
        assert!(bearer(AccessTokenRef::from_static("A1\nX-Injected: yes")).is_err());
    }

    #[test]
    fn existing_authorization_is_left_in_place() {
        let mut req = request("https://app.example.com/me");
        req.headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));

        assert!(!attach(&mut req, AccessTokenRef::from_static("A1")).unwrap());

        assert_eq!(req.headers()[header::AUTHORIZATION], "Basic abc");
    }

    mod https_only_predicate {
        use super::*;

        #[test]
        fn matches_when_request_has_https_scheme() {
            let result = dbg!(HttpsOnly.find_case(true, &request("https://example.com")));
            assert!(result.is_none())
        }

        #[test]
        fn does_not_match_when_request_has_http_scheme() {
            let result = dbg!(HttpsOnly.find_case(false, &request("http://example.com")));
            assert!(result.is_none())
        }
    }

    mod loopback_host_predicate {
        use super::*;

        #[test]
        fn matches_localhost_and_loopback_addresses() {
            assert!(LoopbackHost.eval(&request("http://localhost:3000/me")));
            assert!(LoopbackHost.eval(&request("http://127.0.0.1:8080/me")));
            assert!(LoopbackHost.eval(&request("http://[::1]:8080/me")));
        }

        #[test]
        fn does_not_match_remote_host() {
            let result = dbg!(LoopbackHost.find_case(false, &request("http://example.com")));
            assert!(result.is_none())
        }
    }

    mod default_predicate {
        use super::*;

        #[test]
        fn accepts_https_and_local_http_only() {
            let predicate = HttpsOrLoopback;
            assert!(predicate.eval(&request("https://app.example.com/me")));
            assert!(predicate.eval(&request("http://localhost:3000/me")));
            assert!(!predicate.eval(&request("http://app.example.com/me")));
        }

        #[test]
        fn reports_scheme_and_host_on_mismatch() {
            let case = HttpsOrLoopback
                .find_case(true, &request("http://app.example.com/me"))
                .unwrap();
            assert_eq!(case.products().count(), 2);
        }
    }
}
