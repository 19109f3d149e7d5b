use std::sync::Arc;
use std::time::{Duration, Instant};

use unicorn::engine::throttle::Throttle;

#[tokio::test]
async fn zero_qps_means_no_throttle() {
    assert!(Throttle::new(0).is_none());
}

#[test]
fn period_is_one_second_over_qps() {
    assert_eq!(Throttle::period_for(1), Duration::from_secs(1));
    assert_eq!(Throttle::period_for(100), Duration::from_millis(10));
    assert_eq!(Throttle::period_for(1000), Duration::from_millis(1));
}

#[tokio::test]
async fn first_pulse_waits_one_period() {
    let throttle = Throttle::new(20).unwrap();
    assert_eq!(throttle.period(), Duration::from_millis(50));
    let start = Instant::now();
    throttle.pulse().await;
    assert!(start.elapsed() >= Duration::from_millis(45));
}

#[tokio::test]
async fn shared_throttle_paces_the_aggregate_rate() {
    // 100 pulses per second split across four waiters: 40 pulses in total
    // take about 400ms regardless of how many tasks pull from it.
    let throttle = Arc::new(Throttle::new(100).unwrap());
    let start = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let throttle = Arc::clone(&throttle);
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                throttle.pulse().await;
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(380), "too fast: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1500), "too slow: {:?}", elapsed);
}
