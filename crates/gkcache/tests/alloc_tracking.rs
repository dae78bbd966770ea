//! Leak check: a full insert / lookup / delete / sweep / purge / cleanup
//! cycle must hand back every byte it allocated.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use gkcache::{
    Action, AttributeEntry, CacheConfig, CacheManager, FlowDirection, FlowEntry, FlowKey, MacAddr,
    ManualClock, RequestType, SweepScope, Verdict,
};

struct CountingAlloc;

thread_local! {
    static LIVE_BYTES: Cell<isize> = const { Cell::new(0) };
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            let _ = LIVE_BYTES.try_with(|live| live.set(live.get() + layout.size() as isize));
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        let _ = LIVE_BYTES.try_with(|live| live.set(live.get() - layout.size() as isize));
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

fn live_bytes() -> isize {
    LIVE_BYTES.with(|live| live.get())
}

fn mac(n: u8) -> MacAddr {
    MacAddr::new([0x02, 0, 0, 0, 0, n])
}

fn flow_key(n: u16) -> FlowKey {
    FlowKey::new(
        IpAddr::V6(Ipv6Addr::LOCALHOST),
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)),
        17,
        n,
        53,
    )
}

fn run_cycle() {
    let clock = ManualClock::new(0);
    let mut manager = CacheManager::with_clock(CacheConfig::default(), Arc::new(clock.clone())).unwrap();
    let kinds = [
        RequestType::Fqdn,
        RequestType::Url,
        RequestType::Ipv4,
        RequestType::Ipv6,
        RequestType::App,
    ];

    for d in 0..6u8 {
        for i in 0..40u16 {
            let kind = kinds[i as usize % kinds.len()];
            let verdict = Verdict::new(Action::Block)
                .with_category(i as u32)
                .with_policy(format!("policy-{}", i));
            let mut entry = AttributeEntry::new(mac(d), kind, format!("value-{}-{}", d, i), verdict)
                .with_ttl(if i % 2 == 0 { 5 } else { 500 });
            if kind == RequestType::Fqdn {
                entry = entry.with_redirect(format!("redirect-{}", i));
            }
            manager.insert_attribute(entry).unwrap();

            let direction = if i % 2 == 0 { FlowDirection::Inbound } else { FlowDirection::Outbound };
            manager
                .insert_flow(
                    FlowEntry::new(mac(d), direction, flow_key(i), Verdict::new(Action::Allow).with_policy("flows"))
                        .with_ttl(if i % 3 == 0 { 5 } else { 500 }),
                )
                .unwrap();
        }
    }

    // Replace in place: the displaced payload must be released
    manager
        .insert_attribute(
            AttributeEntry::new(mac(0), RequestType::Sni, "value-0-0", Verdict::new(Action::Allow).with_policy("new"))
                .with_redirect("elsewhere")
                .with_ttl(5),
        )
        .unwrap();

    let _ = manager.lookup_attribute(mac(1), RequestType::Url, "value-1-1");
    manager.delete_attribute(mac(2), RequestType::Host, "value-2-0").unwrap();
    manager.delete_flow(mac(2), FlowDirection::Outbound, &flow_key(1)).unwrap();

    clock.advance(5);
    let _ = manager.lookup_attribute(mac(3), RequestType::Fqdn, "value-3-0");
    manager.sweep_expired(SweepScope::All);
    assert_eq!(manager.count(), manager.recount());

    manager.purge_device(mac(4)).unwrap();
    manager.cleanup();
    assert_eq!(manager.count(), 0);
    assert_eq!(manager.recount(), 0);
}

#[test]
fn test_full_cycle_releases_everything() {
    // First pass pays for one-time process state (hasher seeds, log callsites)
    run_cycle();

    let baseline = live_bytes();
    run_cycle();
    assert_eq!(live_bytes(), baseline);
}
