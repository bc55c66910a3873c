use criterion::{criterion_group, criterion_main, Criterion};
use std::io::Write;

pub fn bench_canon(c: &mut Criterion) {
    c.bench_function("canon plain", |b| {
        b.iter(|| {
            let path = "analysis/results/by_author/\
                nineteenth_century/moby_dick.word_counts.csv";
            remake::canon::canon_path(path);
        })
    });

    c.bench_function("canon with parents", |b| {
        b.iter(|| {
            let path = "analysis/results/by_author/\
                ../../../\
                nineteenth_century/./moby_dick.word_counts.csv";
            remake::canon::canon_path(path);
        })
    });
}

pub fn bench_parse(c: &mut Criterion) {
    let mut input: Vec<u8> = Vec::new();
    writeln!(input, "COUNT := python bin/countwords.py").unwrap();
    writeln!(input, "TXT := $(wildcard books/*.txt)").unwrap();
    for i in 0..50 {
        write!(
            input,
            "results/book{}.dat: books/book{}.txt $(COUNT_SRC)
\t$(COUNT) $< $@ # {}

",
            i, i, i
        )
        .unwrap();
    }

    c.bench_function("parse", |b| {
        b.iter(|| {
            let mut parser = remake::parse::Parser::new(&input);
            while parser.read().unwrap().is_some() {}
        })
    });

    c.bench_function("parse_eval", |b| {
        b.iter(|| {
            remake::parse::parse_eval("$(patsubst books/%.txt,results/%.dat,$(TXT)) $(COUNT) $< $@")
                .unwrap();
        })
    });
}

criterion_group!(benches, bench_canon, bench_parse);
criterion_main!(benches);
