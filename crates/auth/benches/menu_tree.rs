use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use gatekeep_auth::menu::{MenuPermissionMatrix, build_menu_tree};
use gatekeep_core::{MenuId, PermissionId, TenantId};
use gatekeep_infra::directory::{LinkedPermission, MenuRecord, PermissionRecord, ResourceType};

/// `count` menus, `fanout` children per parent, breadth-first ids.
fn menus(count: u64, fanout: u64) -> Vec<MenuRecord> {
    (1..=count)
        .map(|id| MenuRecord {
            id: MenuId::new(id),
            tenant_id: TenantId::DEFAULT,
            parent_id: (id > fanout).then(|| MenuId::new((id - 1) / fanout)),
            code: format!("menu_{id}"),
            title: format!("Menu {id}"),
            route_path: Some(format!("/m/{id}")),
            icon: None,
            sort_order: (id % 7) as i32,
            visible: true,
            enabled: true,
        })
        .collect()
}

fn links(count: u64) -> Vec<(MenuId, LinkedPermission)> {
    (1..=count)
        .flat_map(|id| {
            ["view", "edit"].into_iter().enumerate().map(move |(i, action)| {
                let permission = PermissionRecord {
                    id: PermissionId::new(id * 2 + i as u64),
                    tenant_id: TenantId::DEFAULT,
                    code: format!("menu_{id}:{action}"),
                    name: format!("{action} menu {id}"),
                    resource_type: ResourceType::Menu,
                    action: Some(action.to_string()),
                    menu_id: Some(MenuId::new(id)),
                    resource_path: None,
                    http_method: None,
                };
                (
                    MenuId::new(id),
                    LinkedPermission {
                        permission,
                        is_required: i == 0,
                    },
                )
            })
        })
        .collect()
}

fn bench_tree_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("menu_tree_build");

    for count in [50u64, 500, 5_000] {
        let input = menus(count, 8);
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| build_menu_tree(black_box(input.clone())))
        });
    }

    group.finish();
}

fn bench_matrix_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("menu_matrix_build");

    for count in [50u64, 500, 5_000] {
        let menus = menus(count, 8);
        let links = links(count);
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(
            BenchmarkId::from_parameter(count),
            &(menus, links),
            |b, (menus, links)| {
                b.iter(|| {
                    MenuPermissionMatrix::build(
                        TenantId::DEFAULT,
                        black_box(menus.clone()),
                        black_box(links.clone()),
                    )
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_tree_build, bench_matrix_build);
criterion_main!(benches);
