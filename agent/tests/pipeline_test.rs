use anyhow::Result;
use lookout_agent::config::{AgentConfig, ProcessorConfig};
use lookout_agent::output::JsonLinesSink;
use lookout_agent::source::JsonLinesSource;
use lookout_agent::{run_agent, run_pipeline, EventProcessor, PluginSourceRegistry};
use lookout_shared::types::plugin::PluginSourceInfo;
use serde_json::Value;
use std::io::Write;
use tempfile::NamedTempFile;

fn input(count: u64) -> String {
    let mut text = String::from("# generated events\n");
    for num in 0..count {
        let comm = if num % 2 == 0 { "bash" } else { "cat" };
        text.push_str(&format!(
            r#"{{"num": {num}, "ts": {ts}, "plugin_id": 1, "name": "open", "pid": 100, "tid": 101, "comm": "{comm}", "fields": {{"fd": {fd}}}}}"#,
            num = num,
            ts = 1_000 + num,
            comm = comm,
            fd = num
        ));
        text.push('\n');
    }
    text
}

fn parse_lines(bytes: &[u8]) -> Vec<Value> {
    std::str::from_utf8(bytes)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn test_pipeline_emits_matches_in_order() -> Result<()> {
    for workers in [0, 1, 3] {
        let registry =
            PluginSourceRegistry::from_sources(vec![PluginSourceInfo::new(1, "syscall")])?;
        let mut processor = EventProcessor::new(ProcessorConfig { workers }, registry);
        processor.compile("proc.name = bash and fd >= 4")?;

        let text = input(20);
        let mut source = JsonLinesSource::new(text.as_bytes());
        let mut sink = JsonLinesSink::new(Vec::new());

        let summary = run_pipeline(&mut processor, &mut source, &mut sink).await?;
        assert_eq!(summary.events, 20);
        assert_eq!(summary.matched, 8);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.stats.matched, 8);
        assert_eq!(summary.stats.filtered, 12);

        let out = parse_lines(&sink.into_inner());
        let nums: Vec<u64> = out.iter().map(|v| v["num"].as_u64().unwrap()).collect();
        assert_eq!(nums, vec![4, 6, 8, 10, 12, 14, 16, 18], "workers = {}", workers);
        assert_eq!(out[0]["source"], "syscall");
        assert_eq!(out[0]["comm"], "bash");
        assert_eq!(out[0]["fields"]["fd"], 4);
    }
    Ok(())
}

#[tokio::test]
async fn test_pipeline_skips_malformed_lines() -> Result<()> {
    let mut processor =
        EventProcessor::new(ProcessorConfig { workers: 1 }, PluginSourceRegistry::new());
    processor.compile("evt.name = open")?;

    let text = "{\"name\": \"open\"}\n{broken\n\n{\"name\": \"close\"}\n{\"name\": \"open\"}\n";
    let mut source = JsonLinesSource::new(text.as_bytes());
    let mut sink = JsonLinesSink::new(Vec::new());

    let summary = run_pipeline(&mut processor, &mut source, &mut sink).await?;
    assert_eq!(summary.events, 3);
    assert_eq!(summary.matched, 2);
    assert_eq!(summary.skipped, 1);

    let out = parse_lines(&sink.into_inner());
    assert_eq!(out.len(), 2);
    assert!(out[0].get("source").is_none());
    Ok(())
}

#[tokio::test]
async fn test_pipeline_continues_past_unreadable_records() -> Result<()> {
    let mut processor =
        EventProcessor::new(ProcessorConfig { workers: 1 }, PluginSourceRegistry::new());
    processor.compile("evt.name = open")?;

    let mut text = b"{\"name\": \"open\"}\n{\"name\": \"op\xffen\"}\n".to_vec();
    let blob = "x".repeat(2 << 20);
    text.extend_from_slice(
        format!("{{\"name\": \"open\", \"fields\": {{\"blob\": \"{}\"}}}}\n", blob).as_bytes(),
    );
    text.extend_from_slice(b"{\"name\": \"open\"}\n");

    let mut source = JsonLinesSource::new(text.as_slice());
    let mut sink = JsonLinesSink::new(Vec::new());

    let summary = run_pipeline(&mut processor, &mut source, &mut sink).await?;
    assert_eq!(summary.events, 2);
    assert_eq!(summary.matched, 2);
    assert_eq!(summary.skipped, 2);

    let out = parse_lines(&sink.into_inner());
    let nums: Vec<u64> = out.iter().map(|v| v["num"].as_u64().unwrap()).collect();
    assert_eq!(nums, vec![0, 1]);
    Ok(())
}

#[tokio::test]
async fn test_run_agent_with_files() -> Result<()> {
    let mut input_file = NamedTempFile::new()?;
    input_file.write_all(input(10).as_bytes())?;
    input_file.flush()?;

    let output_dir = tempfile::tempdir()?;
    let output_path = output_dir.path().join("matched.jsonl");

    let config = AgentConfig {
        filter: Some("fd in (1, 3, 5)".to_string()),
        processor: ProcessorConfig { workers: 2 },
        plugins: vec![PluginSourceInfo::new(1, "syscall")],
        ..Default::default()
    };

    let summary = run_agent(
        &config,
        Some(input_file.path().to_path_buf()),
        Some(output_path.clone()),
    )
    .await?;
    assert_eq!(summary.events, 10);
    assert_eq!(summary.matched, 3);

    let out = parse_lines(&std::fs::read(&output_path)?);
    let nums: Vec<u64> = out.iter().map(|v| v["num"].as_u64().unwrap()).collect();
    assert_eq!(nums, vec![1, 3, 5]);
    Ok(())
}

#[tokio::test]
async fn test_run_agent_rejects_bad_setup() {
    let no_filter = AgentConfig::default();
    assert!(run_agent(&no_filter, None, None).await.is_err());

    let bad_filter = AgentConfig {
        filter: Some("fd ==".to_string()),
        ..Default::default()
    };
    let err = run_agent(&bad_filter, None, None).await.unwrap_err();
    assert!(format!("{:#}", err).contains("position 5"));

    let duplicate = AgentConfig {
        filter: Some("fd = 1".to_string()),
        plugins: vec![PluginSourceInfo::new(1, "a"), PluginSourceInfo::new(1, "b")],
        ..Default::default()
    };
    assert!(run_agent(&duplicate, None, None).await.is_err());
}
