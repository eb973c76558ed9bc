use errors::ProviderError;
use metrics::counter;

pub fn record_cache_hit(operation: &str) {
    let labels = [("operation", operation.to_string())];
    counter!("idp_cache_hits_total", &labels).increment(1);
}

pub fn record_cache_miss(operation: &str) {
    let labels = [("operation", operation.to_string())];
    counter!("idp_cache_misses_total", &labels).increment(1);
}

pub fn record_directory_call<T>(operation: &str, result: &Result<T, ProviderError>) {
    let status = match result {
        Ok(_) => "success",
        Err(e) if e.is_not_found() => "not_found",
        Err(_) => "error"
    };
    let labels = [
        ("operation", operation.to_string()),
        ("status", status.to_string())
    ];
    counter!("idp_directory_calls_total", &labels).increment(1);
}

pub fn record_hook_event(event: &str, success: bool) {
    let labels = [
        ("event", event.to_string()),
        ("status", if success { "success" } else { "failure" }.to_string())
    ];
    counter!("idp_sync_hook_events_total", &labels).increment(1);
}
