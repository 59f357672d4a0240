/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Current UTC calendar date. Used as the freeze date when a payment
/// schedule is built at order submission.
pub fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}
