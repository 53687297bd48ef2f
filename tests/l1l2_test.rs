//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 双层编排器的动词策略测试

mod common;

use common::{get_req, hit, hit_e, miss, miss_e, set_req, Out, RecordingResponder, ScriptedHandler};
use memstrata::common::{DeleteRequest, GatRequest, TouchRequest};
use memstrata::error::CacheError;
use memstrata::orcas::{L1L2Orca, Orca};
use memstrata::sync::Replicator;
use std::sync::Arc;

struct Fixture {
    l1: Arc<ScriptedHandler>,
    l2: Arc<ScriptedHandler>,
    res: Arc<RecordingResponder>,
    replicator: Arc<Replicator>,
    orca: L1L2Orca,
}

fn fixture() -> Fixture {
    let l1 = Arc::new(ScriptedHandler::new());
    let l2 = Arc::new(ScriptedHandler::new());
    let res = Arc::new(RecordingResponder::new());
    let replicator = Arc::new(Replicator::start(16, l2.clone()));
    let orca = L1L2Orca::new(l1.clone(), l2.clone(), res.clone(), replicator.clone());
    Fixture {
        l1,
        l2,
        res,
        replicator,
        orca,
    }
}

#[tokio::test]
async fn test_get_l1_hit_never_touches_l2() {
    let f = fixture();
    f.l1.queue_get(vec![hit(b"k", b"v", 7)]);

    f.orca.get(get_req(&[b"k"])).await.unwrap();

    let outs = f.res.outs();
    assert_eq!(outs.len(), 2);
    assert!(matches!(&outs[0], Out::Get(r) if !r.miss && r.data == b"v" && r.opaque == 7));
    assert!(matches!(outs[1], Out::GetEnd { .. }));
    assert!(f.l2.gets.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_get_l1_miss_l2_hit_backfills_l1() {
    let f = fixture();
    f.l1.queue_get(vec![miss(b"k", 3)]);
    f.l2.queue_get_e(vec![hit_e(b"k", b"warm", 42, 3)]);

    f.orca.get(get_req(&[b"k"])).await.unwrap();

    let outs = f.res.outs();
    assert!(matches!(&outs[0], Out::Get(r) if !r.miss && r.data == b"warm" && r.opaque == 3));
    assert!(matches!(outs[1], Out::GetEnd { .. }));

    // 回填带上慢层报告的剩余TTL
    let backfills = f.l1.recorded_sets();
    assert_eq!(backfills.len(), 1);
    assert_eq!(backfills[0].key, b"k");
    assert_eq!(backfills[0].data, b"warm");
    assert_eq!(backfills[0].exptime, 42);
}

#[tokio::test]
async fn test_get_all_miss_is_success() {
    let f = fixture();
    // 两层都走默认全未命中脚本
    f.orca.get(get_req(&[b"a", b"b"])).await.unwrap();

    let outs = f.res.outs();
    assert_eq!(outs.len(), 3);
    assert!(matches!(&outs[0], Out::Get(r) if r.miss));
    assert!(matches!(&outs[1], Out::Get(r) if r.miss));
    assert!(matches!(outs[2], Out::GetEnd { .. }));
}

#[tokio::test]
async fn test_get_backfill_failure_does_not_fail_read() {
    let f = fixture();
    f.l1.queue_get(vec![miss(b"k", 0)]);
    f.l1.queue_set(Err(CacheError::Internal("oom".to_string())));
    f.l2.queue_get_e(vec![hit_e(b"k", b"v", 0, 0)]);

    f.orca.get(get_req(&[b"k"])).await.unwrap();

    let outs = f.res.outs();
    assert!(matches!(&outs[0], Out::Get(r) if !r.miss));
    assert!(matches!(outs[1], Out::GetEnd { .. }));
}

#[tokio::test]
async fn test_get_l1_hard_error_aborts() {
    let f = fixture();
    f.l1.queue_get(vec![Err(CacheError::Internal("io".to_string()))]);

    let err = f.orca.get(get_req(&[b"k"])).await.unwrap_err();
    assert!(matches!(err, CacheError::Internal(_)));
    assert!(f.res.outs().is_empty());
}

#[tokio::test]
async fn test_get_l1_error_after_miss_still_consults_l2() {
    let f = fixture();
    f.l1
        .queue_get(vec![miss(b"a", 0), Err(CacheError::Internal("io".to_string()))]);
    f.l2.queue_get_e(vec![hit_e(b"a", b"1", 0, 0)]);

    let err = f.orca.get(get_req(&[b"a", b"b"])).await.unwrap_err();
    assert!(matches!(err, CacheError::Internal(_)));

    // 出错前收集到的未命中键仍由慢层服务并回填，错误在排空后上报
    let outs = f.res.outs();
    assert_eq!(outs.len(), 1);
    assert!(matches!(&outs[0], Out::Get(r) if !r.miss && r.key == b"a"));
    assert_eq!(f.l1.recorded_sets().len(), 1);
}

#[tokio::test]
async fn test_get_l2_hard_error_aborts() {
    let f = fixture();
    f.l1.queue_get(vec![miss(b"k", 0)]);
    f.l2.queue_get_e(vec![Err(CacheError::Timeout("GET".to_string()))]);

    let err = f.orca.get(get_req(&[b"k"])).await.unwrap_err();
    assert!(matches!(err, CacheError::Timeout(_)));
}

#[tokio::test]
async fn test_get_mixed_hits_and_misses() {
    let f = fixture();
    f.l1.queue_get(vec![hit(b"a", b"1", 0), miss(b"b", 1), miss(b"c", 2)]);
    f.l2.queue_get_e(vec![hit_e(b"b", b"2", 0, 1), miss_e(b"c", 2)]);

    f.orca.get(get_req(&[b"a", b"b", b"c"])).await.unwrap();

    let outs = f.res.outs();
    assert_eq!(outs.len(), 4);
    assert!(matches!(&outs[0], Out::Get(r) if !r.miss && r.opaque == 0));
    assert!(matches!(&outs[1], Out::Get(r) if !r.miss && r.opaque == 1));
    assert!(matches!(&outs[2], Out::Get(r) if r.miss && r.opaque == 2));
    assert!(matches!(outs[3], Out::GetEnd { .. }));
    // 只有慢层命中的键被回填
    assert_eq!(f.l1.recorded_sets().len(), 1);
}

#[tokio::test]
async fn test_set_l1_ok_responds_then_replicates() {
    let f = fixture();
    f.orca.set(set_req(b"k", b"v")).await.unwrap();

    assert_eq!(f.res.outs(), vec![Out::Set { opaque: 0, quiet: false }]);
    assert_eq!(f.l1.recorded_sets().len(), 1);

    // 排空复制队列后副本必达慢层
    f.replicator.shutdown().await;
    let l2_sets = f.l2.recorded_sets();
    assert_eq!(l2_sets.len(), 1);
    assert_eq!(l2_sets[0].key, b"k");
}

#[tokio::test]
async fn test_set_replicates_even_when_responder_fails() {
    let f = fixture();
    f.res.fail_writes();

    let err = f.orca.set(set_req(b"k", b"v")).await.unwrap_err();
    assert!(matches!(err, CacheError::Internal(_)));

    // 回包失败不能让快层已持有的值缺失慢层副本
    f.replicator.shutdown().await;
    assert_eq!(f.l2.recorded_sets().len(), 1);
}

#[tokio::test]
async fn test_replace_replicates_even_when_responder_fails() {
    let f = fixture();
    f.res.fail_writes();

    let err = f.orca.replace(set_req(b"k", b"v")).await.unwrap_err();
    assert!(matches!(err, CacheError::Internal(_)));

    f.replicator.shutdown().await;
    assert_eq!(f.l2.recorded_sets().len(), 1);
}

#[tokio::test]
async fn test_set_l1_fail_falls_back_to_l2() {
    let f = fixture();
    f.l1.queue_set(Err(CacheError::Internal("full".to_string())));

    f.orca.set(set_req(b"k", b"v")).await.unwrap();

    assert_eq!(f.res.outs(), vec![Out::Set { opaque: 0, quiet: false }]);
    // 慢层写入是同步回退，不经复制队列
    assert_eq!(f.l2.recorded_sets().len(), 1);
}

#[tokio::test]
async fn test_set_both_tiers_fail_is_compound_failure() {
    let f = fixture();
    f.l1.queue_set(Err(CacheError::Internal("full".to_string())));
    f.l2.queue_set(Err(CacheError::Timeout("SET".to_string())));

    let err = f.orca.set(set_req(b"k", b"v")).await.unwrap_err();
    assert!(matches!(err, CacheError::CompoundTierFailure));
    assert!(f.res.outs().is_empty());
}

#[tokio::test]
async fn test_delete_l2_then_l1() {
    let f = fixture();
    f.orca
        .delete(DeleteRequest {
            key: b"k".to_vec(),
            opaque: 5,
            quiet: false,
        })
        .await
        .unwrap();

    assert_eq!(f.res.outs(), vec![Out::Delete { opaque: 5, quiet: false }]);
    assert_eq!(f.l2.deletes.lock().unwrap().len(), 1);
    assert_eq!(f.l1.deletes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_l2_miss_short_circuits() {
    let f = fixture();
    f.l2.queue_delete(Err(CacheError::KeyNotFound));

    let err = f
        .orca
        .delete(DeleteRequest {
            key: b"k".to_vec(),
            opaque: 0,
            quiet: false,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CacheError::KeyNotFound));
    // 慢层未命中时快层不被触碰
    assert!(f.l1.deletes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_l2_error_leaves_l1_untouched() {
    let f = fixture();
    f.l2.queue_delete(Err(CacheError::Timeout("DEL".to_string())));

    let err = f
        .orca
        .delete(DeleteRequest {
            key: b"k".to_vec(),
            opaque: 0,
            quiet: false,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CacheError::Timeout(_)));
    assert!(f.l1.deletes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_l1_miss_is_still_a_delete() {
    let f = fixture();
    f.l1.queue_delete(Err(CacheError::KeyNotFound));

    f.orca
        .delete(DeleteRequest {
            key: b"k".to_vec(),
            opaque: 2,
            quiet: false,
        })
        .await
        .unwrap();

    assert_eq!(f.res.outs(), vec![Out::Delete { opaque: 2, quiet: false }]);
}

#[tokio::test]
async fn test_replace_fast_path_replicates_plain_set() {
    let f = fixture();
    f.orca.replace(set_req(b"k", b"v2")).await.unwrap();

    assert_eq!(
        f.res.outs(),
        vec![Out::Replace { opaque: 0, quiet: false }]
    );
    assert_eq!(f.l1.replaces.lock().unwrap().len(), 1);

    // 快路径对慢层补的是普通set，不是replace
    f.replicator.shutdown().await;
    assert_eq!(f.l2.recorded_sets().len(), 1);
    assert!(f.l2.replaces.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_replace_slow_path_consults_l2() {
    let f = fixture();
    f.l1.queue_replace(Err(CacheError::ItemNotStored));

    f.orca.replace(set_req(b"k", b"v2")).await.unwrap();

    assert_eq!(
        f.res.outs(),
        vec![Out::Replace { opaque: 0, quiet: false }]
    );
    assert_eq!(f.l2.replaces.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_replace_missing_everywhere_not_stored() {
    let f = fixture();
    f.l1.queue_replace(Err(CacheError::ItemNotStored));
    f.l2.queue_replace(Err(CacheError::ItemNotStored));

    let err = f.orca.replace(set_req(b"k", b"v")).await.unwrap_err();
    assert!(matches!(err, CacheError::ItemNotStored));
    assert!(f.res.outs().is_empty());
}

#[tokio::test]
async fn test_unsupported_verbs() {
    let f = fixture();
    let touch = TouchRequest {
        key: b"k".to_vec(),
        exptime: 1,
        opaque: 0,
        quiet: false,
    };
    let gat = GatRequest {
        key: b"k".to_vec(),
        exptime: 1,
        opaque: 0,
        quiet: false,
    };

    assert!(matches!(
        f.orca.add(set_req(b"k", b"v")).await.unwrap_err(),
        CacheError::UnsupportedCommand
    ));
    assert!(matches!(
        f.orca.append(set_req(b"k", b"v")).await.unwrap_err(),
        CacheError::UnsupportedCommand
    ));
    assert!(matches!(
        f.orca.prepend(set_req(b"k", b"v")).await.unwrap_err(),
        CacheError::UnsupportedCommand
    ));
    assert!(matches!(
        f.orca.touch(touch).await.unwrap_err(),
        CacheError::UnsupportedCommand
    ));
    assert!(matches!(
        f.orca.gat(gat).await.unwrap_err(),
        CacheError::UnsupportedCommand
    ));
    assert!(matches!(
        f.orca.get_e(get_req(&[b"k"])).await.unwrap_err(),
        CacheError::UnsupportedCommand
    ));
    assert!(matches!(
        f.orca.unknown(0).await.unwrap_err(),
        CacheError::UnsupportedCommand
    ));
}

#[tokio::test]
async fn test_noop_quit_version_passthrough() {
    let f = fixture();
    f.orca.noop(1).await.unwrap();
    f.orca.quit(2, false).await.unwrap();
    f.orca.version(3).await.unwrap();

    assert_eq!(
        f.res.outs(),
        vec![Out::Noop(1), Out::Quit(2), Out::Version(3)]
    );
}
