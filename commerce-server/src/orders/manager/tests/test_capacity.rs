use super::*;
use crate::capacity::CapacityError;

#[test]
fn admission_stops_at_the_seat_budget() {
    let manager = create_test_manager();
    seed_offering(&manager, "off-1", "100.00");
    manager
        .upsert_capacity_rule(CapacityRule::new("session-a", "off-1", 2))
        .unwrap();

    // 两个约束单占满名额
    for _ in 0..2 {
        let order = manager.create_order(order_create("off-1")).unwrap();
        manager.submit_order(&order.id, OrderSubmit::default()).unwrap();
    }

    let err = manager.create_order(order_create("off-1")).unwrap_err();
    assert!(matches!(
        err,
        ManagerError::Capacity(CapacityError::SeatsExhausted { .. })
    ));
}

#[test]
fn drafts_and_canceled_orders_do_not_hold_seats() {
    let manager = create_test_manager();
    seed_offering(&manager, "off-1", "100.00");
    manager
        .upsert_capacity_rule(CapacityRule::new("session-a", "off-1", 1))
        .unwrap();

    // 草稿不占座: 第二单照常创建
    let _draft = manager.create_order(order_create("off-1")).unwrap();
    let second = manager.create_order(order_create("off-1")).unwrap();

    // 占座后取消, 名额又空出来
    let submitted = manager
        .submit_order(&second.id, OrderSubmit::default())
        .unwrap();
    let err = manager.create_order(order_create("off-1")).unwrap_err();
    assert!(matches!(err, ManagerError::Capacity(_)));

    manager.cancel_order(&submitted.id).unwrap();
    manager.create_order(order_create("off-1")).unwrap();
}

#[test]
fn reserved_seats_count_against_the_budget() {
    let manager = create_test_manager();
    seed_offering(&manager, "off-1", "100.00");
    manager
        .upsert_capacity_rule(CapacityRule::new("session-a", "off-1", 3))
        .unwrap();

    // 一张三人的预留单吃掉整个预算
    let mut payload = order_create("off-1");
    payload.seats = Some(3);
    payload.reserved = Some(true);
    let batch = manager.create_order(payload).unwrap();
    manager.submit_order(&batch.id, OrderSubmit::default()).unwrap();
    assert_order_state(&manager, &batch.id, OrderState::ToOwn);

    let err = manager.create_order(order_create("off-1")).unwrap_err();
    assert!(matches!(err, ManagerError::Capacity(_)));
}

#[test]
fn admission_moves_to_the_next_rule_when_one_fills_up() {
    let manager = create_test_manager();
    seed_offering(&manager, "off-1", "100.00");
    let mut first = CapacityRule::new("session-a", "off-1", 1);
    first.position = 0;
    first.discount_percent = Some(10);
    manager.upsert_capacity_rule(first).unwrap();
    let mut second = CapacityRule::new("session-b", "off-1", 1);
    second.position = 1;
    manager.upsert_capacity_rule(second).unwrap();

    let order = manager.create_order(order_create("off-1")).unwrap();
    assert_eq!(order.capacity_rule_ids, vec!["session-a".to_string()]);
    assert_eq!(order.total, dec("90.00"));
    manager.submit_order(&order.id, OrderSubmit::default()).unwrap();

    // session-a 满了, 顺延到 session-b (无折扣)
    let order = manager.create_order(order_create("off-1")).unwrap();
    assert_eq!(order.capacity_rule_ids, vec!["session-b".to_string()]);
    assert_eq!(order.total, dec("100.00"));
}

#[test]
fn unrestricted_offerings_admit_without_rules() {
    let manager = create_test_manager();
    seed_offering(&manager, "off-1", "100.00");

    for _ in 0..5 {
        let order = manager.create_order(order_create("off-1")).unwrap();
        manager.submit_order(&order.id, OrderSubmit::default()).unwrap();
    }
}

#[test]
fn organization_with_fewest_binding_orders_wins() {
    let manager = create_test_manager();
    let mut offering = Offering::new("off-1", "DEMO-101", "prod-1", "Demo Course", dec("100.00"));
    offering.organizations = vec!["org-a".to_string(), "org-b".to_string()];
    manager.upsert_offering(offering).unwrap();

    // 平手取 ID 升序
    let first = manager.create_order(order_create("off-1")).unwrap();
    assert_eq!(first.organization_id.as_deref(), Some("org-a"));
    manager.submit_order(&first.id, OrderSubmit::default()).unwrap();

    // org-a 已有 1 个约束单, 新单归 org-b
    let second = manager.create_order(order_create("off-1")).unwrap();
    assert_eq!(second.organization_id.as_deref(), Some("org-b"));
    manager.submit_order(&second.id, OrderSubmit::default()).unwrap();

    let third = manager.create_order(order_create("off-1")).unwrap();
    assert_eq!(third.organization_id.as_deref(), Some("org-a"));
}
