// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Rendered command lines, observed through the dry-run transport.

use std::collections::BTreeMap;
use std::sync::Arc;

use deckhand::{Backend, Config, DryRunConnector, Host};

fn dry_run(config: Config) -> (Backend, DryRunConnector, Host) {
    let connector = DryRunConnector::new();
    let host = Host::new("example.com");
    let backend = Backend::new(host.clone(), Arc::new(connector.clone()), Arc::new(config));
    (backend, connector, host)
}

#[tokio::test]
async fn test_simple_and_nested_commands() {
    let (mut backend, connector, host) = dry_run(Config::default());

    backend.execute("date", ()).await.unwrap();
    backend.execute("ls", ["-l"]).await.unwrap();
    {
        let mut env = backend.with_env([("rails_env", "production")]);
        let mut tmp = env.within("/tmp").await.unwrap();
        let root = tmp.as_user("root").await.unwrap();
        root.execute("touch", ["restart.txt"]).await.unwrap();
    }

    assert_eq!(
        connector.lines_for(&host),
        vec![
            "/usr/bin/env date".to_string(),
            "/usr/bin/env ls -l".to_string(),
            "if test ! -d /tmp; then echo \"Directory does not exist '/tmp'\" 1>&2; false; fi"
                .to_string(),
            "if ! sudo -u root whoami > /dev/null; then echo \"You cannot switch to user 'root' using sudo, please check the sudoers file\" 1>&2; false; fi"
                .to_string(),
            "cd /tmp && ( RAILS_ENV=production sudo -u root RAILS_ENV=production -- sh -c '/usr/bin/env touch restart.txt' )"
                .to_string(),
        ]
    );
}

#[tokio::test]
async fn test_scope_is_restored_after_block() {
    let (mut backend, connector, host) = dry_run(Config::default());
    {
        let tmp = backend.within("/tmp").await.unwrap();
        tmp.execute("ls", ()).await.unwrap();
    }
    backend.execute("ls", ()).await.unwrap();

    let lines = connector.lines_for(&host);
    assert_eq!(lines.last().map(String::as_str), Some("/usr/bin/env ls"));
}

#[tokio::test]
async fn test_rendering_is_deterministic() {
    let (mut backend, _, _) = dry_run(Config::default());
    let mut env = backend.with_env([("a", "1"), ("b", "two words")]);
    let user = env.as_user("deploy").await.unwrap();

    let first = user.command("echo", ["$HOME"]);
    let second = user.command("echo", ["$HOME"]);
    assert_eq!(first.rendered_line(), second.rendered_line());
    assert_eq!(
        first.rendered_line(),
        "( A=1 B='two words' sudo -u deploy A=1 B='two words' -- sh -c '/usr/bin/env echo '\\''$HOME'\\''' )"
    );
}

#[tokio::test]
async fn test_relative_directories_nest() {
    let (mut backend, connector, host) = dry_run(Config::default());
    {
        let mut app = backend.within("/var/www").await.unwrap();
        let current = app.within("current").await.unwrap();
        current.execute("ls", ()).await.unwrap();
    }

    let lines = connector.lines_for(&host);
    assert!(lines[1].contains("test ! -d /var/www/current;"));
    assert_eq!(lines[2], "cd /var/www/current && /usr/bin/env ls");
}

#[tokio::test]
async fn test_configured_prefixes() {
    let config = Config {
        command_map: BTreeMap::from([("rake".to_string(), "bundle exec".to_string())]),
        umask: Some("077".to_string()),
        default_env: BTreeMap::from([("lang".to_string(), "C".to_string())]),
        ..Config::default()
    };
    let (mut backend, connector, host) = dry_run(config);
    {
        let app = backend.within("/srv/app").await.unwrap();
        app.execute("rake", ["db:migrate"]).await.unwrap();
    }

    assert_eq!(
        connector.lines_for(&host).last().map(String::as_str),
        Some("cd /srv/app && umask 077 && ( LANG=C bundle exec rake 'db:migrate' )")
    );
}

#[tokio::test]
async fn test_shell_snippets_are_not_wrapped() {
    let (mut backend, connector, host) = dry_run(Config::default());
    {
        let tmp = backend.within("/tmp").await.unwrap();
        tmp.execute("echo hi > out.txt", ()).await.unwrap();
    }
    assert_eq!(
        connector.lines_for(&host).last().map(String::as_str),
        Some("echo hi > out.txt")
    );
}
