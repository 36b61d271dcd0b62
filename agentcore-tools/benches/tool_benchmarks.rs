use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rustant_tools::registry::{Tool, ToolRegistry};
use serde_json::json;
use std::sync::Arc;

fn bench_tool_registry(c: &mut Criterion) {
    c.bench_function("registry_register_builtin_tools", |b| {
        b.iter(|| {
            let mut registry = ToolRegistry::new();
            rustant_tools::register_builtin_tools(&mut registry, std::env::temp_dir());
            registry
        })
    });

    c.bench_function("registry_get_tool", |b| {
        let mut registry = ToolRegistry::new();
        rustant_tools::register_builtin_tools(&mut registry, std::env::temp_dir());
        b.iter(|| registry.get(black_box("read_file")))
    });

    c.bench_function("registry_list_definitions", |b| {
        let mut registry = ToolRegistry::new();
        rustant_tools::register_builtin_tools(&mut registry, std::env::temp_dir());
        b.iter(|| registry.list_definitions())
    });

    c.bench_function("registry_list_names", |b| {
        let mut registry = ToolRegistry::new();
        rustant_tools::register_builtin_tools(&mut registry, std::env::temp_dir());
        b.iter(|| registry.list_names())
    });
}

fn bench_todo_manager_tool(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut registry = ToolRegistry::new();
    rustant_tools::register_builtin_tools(&mut registry, std::env::temp_dir());
    let todo = registry.get("todo_manager").unwrap();

    c.bench_function("todo_manager_add", |b| {
        b.iter(|| {
            rt.block_on(async {
                todo.execute(black_box(
                    json!({"action": "add", "title": "bench task", "priority": "medium"}),
                ))
                .await
            })
        })
    });

    c.bench_function("todo_manager_list", |b| {
        b.iter(|| rt.block_on(async { todo.execute(black_box(json!({"action": "list"}))).await }))
    });
}

fn bench_apply_patch_tool(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("bench.txt"), "A\nB\nC\n").unwrap();
    let mut registry = ToolRegistry::new();
    rustant_tools::register_builtin_tools(&mut registry, dir.path().to_path_buf());
    let patch = registry.get("apply_patch").unwrap();

    c.bench_function("apply_patch_single_hunk", |b| {
        b.iter(|| {
            std::fs::write(dir.path().join("bench.txt"), "A\nB\nC\n").unwrap();
            rt.block_on(async {
                patch
                    .execute(black_box(json!({
                        "path": "bench.txt",
                        "diff": "@@ -2,1 +2,1 @@\n-B\n+B2\n"
                    })))
                    .await
            })
        })
    });
}

fn bench_tool_schema_generation(c: &mut Criterion) {
    let mut registry = ToolRegistry::new();
    rustant_tools::register_builtin_tools(&mut registry, std::env::temp_dir());

    c.bench_function("all_tools_parameters_schema", |b| {
        let tools: Vec<Arc<dyn Tool>> = registry
            .list_names()
            .iter()
            .filter_map(|n| registry.get(n))
            .collect();
        b.iter(|| {
            for tool in &tools {
                black_box(tool.parameters_schema());
            }
        })
    });
}

criterion_group!(
    benches,
    bench_tool_registry,
    bench_todo_manager_tool,
    bench_apply_patch_tool,
    bench_tool_schema_generation,
);
criterion_main!(benches);
