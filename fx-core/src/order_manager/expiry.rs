//! Expiry-timestamp computation (spec §4.1 "Expiry"): DAY orders expire at
//! 23:59:59 local, IOC/FOK expire one second after submission, GTC never
//! expires.

use crate::core::order::TimeInForce;
use chrono::{Local, NaiveTime, TimeZone};
use std::time::{Duration, SystemTime};

pub fn compute_expiry(tif: TimeInForce, now: SystemTime) -> Option<SystemTime> {
    match tif {
        TimeInForce::Gtc => None,
        TimeInForce::Ioc | TimeInForce::Fok => Some(now + Duration::from_secs(1)),
        TimeInForce::Day => Some(end_of_local_day(now)),
    }
}

fn end_of_local_day(now: SystemTime) -> SystemTime {
    let local_now = chrono::DateTime::<Local>::from(now);
    let end_of_day_naive = local_now.date_naive().and_time(
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999).expect("valid constant time"),
    );
    match Local.from_local_datetime(&end_of_day_naive).single() {
        Some(dt) => dt.into(),
        None => now + Duration::from_secs(24 * 3600),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gtc_never_expires() {
        assert_eq!(compute_expiry(TimeInForce::Gtc, SystemTime::now()), None);
    }

    #[test]
    fn ioc_expires_one_second_after_submission() {
        let now = SystemTime::now();
        let expiry = compute_expiry(TimeInForce::Ioc, now).unwrap();
        assert_eq!(expiry, now + Duration::from_secs(1));
    }

    #[test]
    fn day_order_expires_before_midnight() {
        let now = SystemTime::now();
        let expiry = compute_expiry(TimeInForce::Day, now).unwrap();
        assert!(expiry >= now);
        let local_expiry = chrono::DateTime::<Local>::from(expiry);
        assert_eq!(local_expiry.time().hour_mod(), (23, 59, 59));
    }

    trait TimeHms {
        fn hour_mod(&self) -> (u32, u32, u32);
    }
    impl TimeHms for chrono::NaiveTime {
        fn hour_mod(&self) -> (u32, u32, u32) {
            use chrono::Timelike;
            (self.hour(), self.minute(), self.second())
        }
    }
}
