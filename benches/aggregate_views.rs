use std::fmt::Write as _;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use placement_metrics::{
    catalog,
    data::Dataset,
    filter::FilterState,
    ingest::{self, IngestOptions},
    session::Session,
    view::ViewDefinition,
};

const DEPARTMENTS: [&str; 6] = ["CSE", "ECE", "EEE", "MECH", "CIVIL", "IT"];
const COMPANIES: [&str; 5] = ["TCS", "Zoho", "Infosys", "Wipro", "Accenture"];

fn generate_register(rows: usize) -> String {
    let mut csv = String::from(
        "Reg No,Student Name,Department,Batch,PI Name,Gender,Quota,Hostel,Placement Status,\
         Maximum Salary,Willing,Company 1,Salary (Company 1),Company 2,Salary (Company 2)\n",
    );
    for i in 0..rows {
        let dept = DEPARTMENTS[i % DEPARTMENTS.len()];
        let status = if i % 4 == 0 { "Not Placed" } else { "Placed" };
        let first = COMPANIES[i % COMPANIES.len()];
        let second = if i % 3 == 0 { COMPANIES[(i + 1) % COMPANIES.len()] } else { "" };
        let package = 300_000 + (i % 40) * 10_000;
        let _ = writeln!(
            csv,
            "R{i:06},Student {i},{dept},{},PI {},{},{},{},{status},\"₹{package}\",{},{first},{package},{second},{}",
            2022 + i % 4,
            i % 12,
            if i % 2 == 0 { "F" } else { "M" },
            if i % 5 == 0 { "Management" } else { "Government" },
            if i % 3 == 0 { "Hostel" } else { "Day Scholar" },
            if i % 7 == 0 { "No" } else { "Yes" },
            if second.is_empty() { 0 } else { package / 2 },
        );
    }
    csv
}

fn load(view: &ViewDefinition, csv: &str) -> Dataset {
    ingest::ingest_bytes(
        csv.as_bytes(),
        "register.csv",
        &view.schema,
        &IngestOptions::default(),
    )
    .expect("ingest register")
    .dataset
}

fn bench_views(c: &mut Criterion) {
    let csv = generate_register(20_000);
    let mut group = c.benchmark_group("aggregate_views");

    for name in ["student-placements", "gender-analysis", "company-offers"] {
        let view = catalog::find(name).expect("view");
        let dataset = load(&view, &csv);
        let filter = FilterState::new().exact("Dept", "CSE");
        group.bench_function(name, |b| {
            b.iter(|| view.run(&dataset, &filter));
        });
    }

    let view = catalog::find("student-placements").expect("view");
    group.bench_function("ingest_register", |b| {
        b.iter(|| load(&view, &csv));
    });

    group.bench_function("memoized_rerender", |b| {
        b.iter_batched(
            || {
                let mut session = Session::new(view.clone(), IngestOptions::default());
                session
                    .upload_bytes(csv.as_bytes(), "register.csv")
                    .expect("upload");
                session
            },
            |mut session| {
                for _ in 0..10 {
                    session.result();
                }
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_views);
criterion_main!(benches);
