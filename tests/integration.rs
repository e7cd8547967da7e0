use std::{env, fs, path::PathBuf, process::Command};

#[test]
fn basic_workflow() {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("basic_workflow");

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");

    let config_path = test_dir.join("config.toml");
    let config_contents = String::new()
        + "name_tag = \"station_1\"\n"
        + "min_points = 1\n"
        + "velocity_fs = 22.0\n";

    fs::write(&config_path, config_contents).expect("failed to write config file");

    // three snapshots on a shared 2x2 grid; one vector flagged bad
    for (i_file, u_val) in [1.0, 3.0, 5.0].iter().enumerate() {
        let chc = if i_file == 2 { -1 } else { 1 };
        let contents = String::new()
            + "X mm, Y mm, U m/s, V m/s, W m/s, CHC\n"
            + &format!("0.0, 0.0, {u_val}, 0.5, 0.1, 1\n")
            + &format!("1.0, 0.0, {u_val}, 0.5, 0.1, 1\n")
            + &format!("0.0, 1.0, {u_val}, 0.5, 0.1, {chc}\n")
            + &format!("1.0, 1.0, {u_val}, 0.5, 0.1, 1\n");

        let path = test_dir.join(format!("snapshot-{i_file:04}.v3d"));
        fs::write(&path, contents).expect("failed to write v3d file");
    }

    fn run_bin(args: &[&str]) {
        let bin = PathBuf::from(env!("CARGO_BIN_EXE_pivstat"));

        let output = Command::new(bin)
            .args(args)
            .output()
            .expect("failed to execute command");

        let stdout_str =
            std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
        let stderr_str =
            std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");

        assert!(
            output.status.success(),
            "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
        );
    }

    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    run_bin(&["--data-dir", test_dir_str, "average"]);
    assert!(test_dir.join("results.msgpack").exists());

    run_bin(&["--data-dir", test_dir_str, "average", "--min-points", "2"]);
    assert!(test_dir.join("results.msgpack").exists());

    run_bin(&["--data-dir", test_dir_str, "clean"]);
    assert!(!test_dir.join("results.msgpack").exists());

    fs::remove_dir_all(&test_dir).ok();
}
