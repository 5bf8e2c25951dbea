use std::io::Read;
use std::thread;
use std::time::Duration;

pub(crate) const USER_AGENT: &str = concat!("anishelf/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) attempts: usize,
    pub(crate) retry_delay: Duration,
}

impl RetryPolicy {
    pub(crate) const CATALOG: Self = Self {
        connect_timeout: Duration::from_secs(5),
        read_timeout: Duration::from_secs(20),
        attempts: 3,
        retry_delay: Duration::from_secs(1),
    };

    pub(crate) const COVER: Self = Self {
        connect_timeout: Duration::from_secs(5),
        read_timeout: Duration::from_secs(10),
        attempts: 2,
        retry_delay: Duration::from_millis(500),
    };
}

#[derive(Debug, Clone)]
pub(crate) struct Fetched {
    pub(crate) bytes: Vec<u8>,
    pub(crate) content_type: Option<String>,
}

fn should_retry_http_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

pub(crate) fn get_text_with_retries(
    url: &str,
    referer: &str,
    query: &[(String, String)],
    policy: RetryPolicy,
) -> Result<String, String> {
    call_with_retries(url, referer, query, policy, |response| {
        response
            .into_string()
            .map_err(|err| format!("request failed: response decode failed: {err}"))
    })
}

pub(crate) fn get_bytes_with_retries(
    url: &str,
    referer: &str,
    policy: RetryPolicy,
    max_bytes: u64,
) -> Result<Fetched, String> {
    call_with_retries(url, referer, &[], policy, |response| {
        let content_type = Some(response.content_type().trim().to_string())
            .filter(|value| !value.is_empty());
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(max_bytes.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(|err| format!("request failed: body read failed: {err}"))?;
        if bytes.len() as u64 > max_bytes {
            return Err(format!("request failed: body exceeded {max_bytes} bytes"));
        }
        Ok(Fetched {
            bytes,
            content_type,
        })
    })
}

fn call_with_retries<T, F>(
    url: &str,
    referer: &str,
    query: &[(String, String)],
    policy: RetryPolicy,
    read: F,
) -> Result<T, String>
where
    F: Fn(ureq::Response) -> Result<T, String>,
{
    let attempts = policy.attempts.max(1);
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(policy.connect_timeout)
        .timeout_read(policy.read_timeout)
        .timeout_write(policy.read_timeout)
        .user_agent(USER_AGENT)
        .build();

    for attempt in 1..=attempts {
        let mut request = agent.get(url).set("Referer", referer);
        for (key, value) in query {
            request = request.query(key, value);
        }

        match request.call() {
            Ok(response) => return read(response),
            Err(ureq::Error::Status(status, response)) => {
                let response_body = response.into_string().ok().unwrap_or_default();
                let body = response_body.trim();
                let status_error = if body.is_empty() {
                    format!("HTTP status {status}")
                } else {
                    let truncated = body.chars().take(240).collect::<String>();
                    format!("HTTP status {status} ({truncated})")
                };

                if should_retry_http_status(status) && attempt < attempts {
                    tracing::debug!(url, attempt, status, "retrying request");
                    thread::sleep(policy.retry_delay);
                    continue;
                }

                if should_retry_http_status(status) {
                    return Err(format!(
                        "request failed after {attempts} attempt(s): {status_error}"
                    ));
                }

                return Err(format!("request failed: {status_error}"));
            }
            Err(ureq::Error::Transport(err)) => {
                let transport_error = format!("transport error: {err}");
                if attempt < attempts {
                    tracing::debug!(url, attempt, error = %err, "retrying request");
                    thread::sleep(policy.retry_delay);
                    continue;
                }
                return Err(format!(
                    "request failed after {attempts} attempt(s): {transport_error}"
                ));
            }
        }
    }

    Err("request failed: exhausted attempts without a concrete error".to_string())
}
