//! `hatch init` — write a commented sample config.

use std::path::Path;

use anyhow::{bail, Result};

const SAMPLE_CONFIG: &str = r#"# Hatch configuration
# Expose local scripts and HTTP APIs as MCP tools for AI agents.

name: my-actions
version: "1.0.0"

actions:
  # Example 1: inline shell script
  - name: hello
    description: Say hello to someone
    parameters:
      - name: name
        type: string
        description: Name of the person to greet
        required: true
    process:
      shell: echo "Hello, {{name}}!"

  # Example 2: list files in a directory
  - name: list_files
    description: List files in a directory
    parameters:
      - name: path
        type: string
        description: Directory path to list
        default: "."
    process:
      shell: ls -la "{{path}}"

  # Example 3: run a script file
  # - name: analyze
  #   description: Run analysis script
  #   parameters:
  #     - name: input
  #       type: string
  #       required: true
  #   process:
  #     command: python3
  #     args: ["./scripts/analyze.py", "{{input}}"]
  #     working_dir: "/path/to/project"

  # Example 4: HTTP API call
  # - name: get_weather
  #   description: Get weather for a city
  #   parameters:
  #     - name: city
  #       type: string
  #       required: true
  #   http:
  #     method: GET
  #     url: "https://api.example.com/weather?city={{city}}"
  #     headers:
  #       Authorization: "Bearer ${API_KEY}"
  #     extract_json: "data.temperature"
"#;

pub fn run(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        bail!(
            "{} already exists. Remove it first or use a different directory",
            config_path.display()
        );
    }

    std::fs::write(config_path, SAMPLE_CONFIG)?;

    println!("Created {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to add your actions", config_path.display());
    println!("  2. Run `hatch run` to start the tunnel");

    Ok(())
}
