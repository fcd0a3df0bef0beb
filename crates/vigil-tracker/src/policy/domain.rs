//! Canonical search domain policy.
//!
//! The check endpoint answers with a bare suffix such as `.google.de`. The
//! suffix is turned into a homepage URL and accepted only if it names the root
//! of an allow-listed parent domain (optionally under `www.`) on the scheme's
//! standard port.

use tracing::warn;
use url::Url;

use super::{Evaluation, Rejection, ResponsePolicy};
use crate::config::TrackerMode;
use crate::error::StoreResult;
use crate::fetch::FetchResponse;
use crate::store::{PreferenceStore, keys};

/// Homepage used before any server answer has been accepted.
pub const DEFAULT_HOMEPAGE: &str = "https://www.google.com/";

/// Marker every valid response must start with (case-insensitive).
pub const DEFAULT_MARKER: &str = ".google.";

/// Scheme and host prefix prepended to the response suffix.
pub const DEFAULT_PREFIX: &str = "https://www";

/// Parent domains accepted by default: every country domain serving search.
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
    "google.com",
    "google.ad",
    "google.ae",
    "google.com.af",
    "google.com.ag",
    "google.com.ai",
    "google.al",
    "google.am",
    "google.co.ao",
    "google.com.ar",
    "google.as",
    "google.at",
    "google.com.au",
    "google.az",
    "google.ba",
    "google.com.bd",
    "google.be",
    "google.bf",
    "google.bg",
    "google.com.bh",
    "google.bi",
    "google.bj",
    "google.com.bn",
    "google.com.bo",
    "google.com.br",
    "google.bs",
    "google.bt",
    "google.co.bw",
    "google.by",
    "google.com.bz",
    "google.ca",
    "google.cat",
    "google.cd",
    "google.cf",
    "google.cg",
    "google.ch",
    "google.ci",
    "google.co.ck",
    "google.cl",
    "google.cm",
    "google.cn",
    "google.com.co",
    "google.co.cr",
    "google.com.cu",
    "google.cv",
    "google.com.cy",
    "google.cz",
    "google.de",
    "google.dj",
    "google.dk",
    "google.dm",
    "google.com.do",
    "google.dz",
    "google.com.ec",
    "google.ee",
    "google.com.eg",
    "google.es",
    "google.com.et",
    "google.fi",
    "google.com.fj",
    "google.fm",
    "google.fr",
    "google.ga",
    "google.ge",
    "google.gg",
    "google.com.gh",
    "google.com.gi",
    "google.gl",
    "google.gm",
    "google.gr",
    "google.com.gt",
    "google.gy",
    "google.com.hk",
    "google.hn",
    "google.hr",
    "google.ht",
    "google.hu",
    "google.co.id",
    "google.ie",
    "google.co.il",
    "google.im",
    "google.co.in",
    "google.iq",
    "google.is",
    "google.it",
    "google.je",
    "google.com.jm",
    "google.jo",
    "google.co.jp",
    "google.co.ke",
    "google.com.kh",
    "google.ki",
    "google.kg",
    "google.co.kr",
    "google.com.kw",
    "google.kz",
    "google.la",
    "google.com.lb",
    "google.li",
    "google.lk",
    "google.co.ls",
    "google.lt",
    "google.lu",
    "google.lv",
    "google.com.ly",
    "google.co.ma",
    "google.md",
    "google.me",
    "google.mg",
    "google.mk",
    "google.ml",
    "google.com.mm",
    "google.mn",
    "google.com.mt",
    "google.mu",
    "google.mv",
    "google.mw",
    "google.com.mx",
    "google.com.my",
    "google.co.mz",
    "google.com.na",
    "google.com.ng",
    "google.com.ni",
    "google.ne",
    "google.nl",
    "google.no",
    "google.com.np",
    "google.nr",
    "google.nu",
    "google.co.nz",
    "google.com.om",
    "google.com.pa",
    "google.com.pe",
    "google.com.pg",
    "google.com.ph",
    "google.com.pk",
    "google.pl",
    "google.pn",
    "google.com.pr",
    "google.ps",
    "google.pt",
    "google.com.py",
    "google.com.qa",
    "google.ro",
    "google.rs",
    "google.ru",
    "google.rw",
    "google.com.sa",
    "google.com.sb",
    "google.sc",
    "google.se",
    "google.com.sg",
    "google.sh",
    "google.si",
    "google.sk",
    "google.com.sl",
    "google.sn",
    "google.so",
    "google.sm",
    "google.sr",
    "google.st",
    "google.com.sv",
    "google.td",
    "google.tg",
    "google.co.th",
    "google.com.tj",
    "google.tl",
    "google.tm",
    "google.tn",
    "google.to",
    "google.com.tr",
    "google.tt",
    "google.com.tw",
    "google.co.tz",
    "google.com.ua",
    "google.co.ug",
    "google.co.uk",
    "google.com.uy",
    "google.co.uz",
    "google.com.vc",
    "google.co.ve",
    "google.vg",
    "google.co.vi",
    "google.com.vn",
    "google.vu",
    "google.ws",
    "google.co.za",
    "google.co.zm",
    "google.co.zw",
];

/// Policy for the canonical search domain tracker.
#[derive(Debug, Clone)]
pub struct DomainPolicy {
    marker: String,
    prefix: String,
    default_value: Url,
    allowed_domains: Vec<String>,
}

impl DomainPolicy {
    /// Build a policy from explicit parts.
    ///
    /// `marker` is compared case-insensitively; `allowed_domains` are matched
    /// against the candidate host exactly or with a single `www.` label.
    #[must_use]
    pub fn new(
        marker: impl Into<String>,
        prefix: impl Into<String>,
        default_value: Url,
        allowed_domains: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            marker: marker.into(),
            prefix: prefix.into(),
            default_value,
            allowed_domains: allowed_domains
                .into_iter()
                .map(|domain| domain.into().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Policy accepting the built-in set of search domains.
    ///
    /// # Panics
    ///
    /// Never in practice: the built-in homepage is a valid URL.
    #[must_use]
    pub fn search_domain() -> Self {
        let default_value = Url::parse(DEFAULT_HOMEPAGE)
            .unwrap_or_else(|err| unreachable!("built-in homepage must parse: {err}"));
        Self::new(
            DEFAULT_MARKER,
            DEFAULT_PREFIX,
            default_value,
            DEFAULT_ALLOWED_DOMAINS.iter().copied(),
        )
    }

    /// Value used when nothing has been accepted yet.
    #[must_use]
    pub const fn default_value(&self) -> &Url {
        &self.default_value
    }

    /// Validate a response body into a candidate homepage URL.
    ///
    /// # Errors
    ///
    /// Returns the first failed check as a [`Rejection`].
    pub fn parse_candidate(&self, body: &str) -> Result<Url, Rejection> {
        let suffix = body.trim_ascii();
        let has_marker = suffix
            .get(..self.marker.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(&self.marker));
        if !has_marker {
            return Err(Rejection::MissingMarker);
        }

        let candidate =
            Url::parse(&format!("{}{suffix}", self.prefix)).map_err(|_| Rejection::InvalidUrl)?;
        if candidate.path().len() > 1 {
            return Err(Rejection::UnexpectedPath);
        }
        if candidate.query().is_some() {
            return Err(Rejection::UnexpectedQuery);
        }
        if candidate.fragment().is_some() {
            return Err(Rejection::UnexpectedFragment);
        }
        if candidate.port().is_some() {
            return Err(Rejection::NonStandardPort);
        }
        if !candidate.username().is_empty()
            || candidate.password().is_some()
            || !self.is_allowed_host(candidate.host_str())
        {
            return Err(Rejection::ForeignDomain);
        }
        Ok(candidate)
    }

    fn is_allowed_host(&self, host: Option<&str>) -> bool {
        let Some(host) = host else {
            return false;
        };
        let bare = host.strip_prefix("www.").unwrap_or(host);
        self.allowed_domains.iter().any(|domain| domain == bare)
    }
}

impl Default for DomainPolicy {
    fn default() -> Self {
        Self::search_domain()
    }
}

impl ResponsePolicy for DomainPolicy {
    type Value = Url;

    fn kind(&self) -> &'static str {
        "canonical_domain"
    }

    fn initial_value(&self, mode: TrackerMode, store: &dyn PreferenceStore) -> Url {
        if mode == TrackerMode::Fixed {
            return self.default_value.clone();
        }
        match store.get_string(keys::LAST_KNOWN_VALUE) {
            Some(raw) => Url::parse(&raw).unwrap_or_else(|_| {
                warn!(value = %raw, "ignoring unparseable persisted domain");
                self.default_value.clone()
            }),
            None => self.default_value.clone(),
        }
    }

    fn evaluate(&self, current: &Url, response: &FetchResponse) -> Evaluation<Url> {
        match self.parse_candidate(&response.body_text()) {
            Ok(candidate) if candidate.as_str() == current.as_str() => Evaluation::Unchanged,
            Ok(candidate) => Evaluation::Changed(candidate),
            Err(rejection) => Evaluation::Rejected(rejection),
        }
    }

    fn persist(&self, value: &Url, store: &dyn PreferenceStore) -> StoreResult<()> {
        store.set_string(keys::LAST_KNOWN_VALUE, value.as_str())
    }
}
