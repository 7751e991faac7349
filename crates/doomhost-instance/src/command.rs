//! Engine command line construction.

use std::path::Path;

use crate::{HostRequest, LaunchSettings};

/// Builds the full argument vector for one instance, program first.
///
/// Order matters to the engine: console variables given with `+` are
/// applied left to right after the files are loaded.
pub fn build_command(request: &HostRequest, launch: &LaunchSettings, port: u16) -> Vec<String> {
    let mut args = CommandLine::default();

    args.push(launch.executable.to_string_lossy());
    args.push("-host");
    args.pair("-port", port);
    args.pair("+sv_hostname", format!("{}{}", launch.host_label, request.hostname));
    args.pair("-iwad", in_dir(&launch.iwad_dir, &request.iwad));

    for iwad in &request.extraiwads {
        args.pair("-file", in_dir(&launch.iwad_dir, iwad));
    }
    if request.data {
        for bundled in [&launch.actors_file, &launch.data_file] {
            args.pair("-file", in_dir(&launch.wad_dir, bundled));
        }
    }
    for wad in &request.wads {
        args.pair("-file", in_dir(&launch.wad_dir, wad));
    }

    args.pair(request.gamemode.as_str(), "true");
    args.pair("-skill", request.skill);
    if let Some(config) = &request.config {
        args.pair("+exec", in_dir(&launch.cfg_dir, config));
    }

    args.positive("+dmflags", request.dmflags);
    args.positive("+dmflags2", request.dmflags2);
    args.positive("+zadmflags", request.zadmflags);
    args.positive("+compatflags", request.compatflags);
    args.positive("+zacompatflags", request.zacompatflags);
    if request.instagib {
        args.pair("+instagib", "true");
    }
    if request.buckshot {
        args.pair("+buckshot", "true");
    }
    args.positive("+fraglimit", request.fraglimit);
    args.positive("+pointlimit", request.pointlimit);
    args.positive("+duellimit", request.duellimit);
    args.positive("+timelimit", request.timelimit);

    args.pair("+sv_maxclients", request.maxclients);
    args.pair("+sv_maxplayers", request.maxplayers);
    args.positive("+sv_maxlives", request.maxlives);
    args.pair("+sv_suddendeath", request.suddendeath);

    if let Some(password) = &request.password {
        args.pair("+sv_forcepassword", "true");
        args.pair("+sv_password", password);
    }
    if let Some(password) = &request.joinpassword {
        args.pair("+sv_forcejoinpassword", "true");
        args.pair("+sv_joinpassword", password);
    }

    args.0
}

fn in_dir(dir: &Path, name: &str) -> String {
    dir.join(name).to_string_lossy().into_owned()
}

#[derive(Default)]
struct CommandLine(Vec<String>);

impl CommandLine {
    fn push(&mut self, arg: impl ToString) {
        self.0.push(arg.to_string());
    }

    fn pair(&mut self, name: &str, value: impl ToString) {
        self.push(name);
        self.push(value);
    }

    /// Emits `name value` only when the value is set.
    fn positive(&mut self, name: &str, value: i64) {
        if value > 0 {
            self.pair(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::GameMode;

    fn launch() -> LaunchSettings {
        LaunchSettings {
            executable: PathBuf::from("/opt/zandronum/zandronum-server"),
            host_label: "[DH] ".to_string(),
            iwad_dir: PathBuf::from("/srv/iwads"),
            wad_dir: PathBuf::from("/srv/wads"),
            cfg_dir: PathBuf::from("/srv/cfgs"),
            actors_file: "skulltag_actors.pk3".to_string(),
            data_file: "skulltag_data.pk3".to_string(),
            ..LaunchSettings::default()
        }
    }

    fn strs(args: &[String]) -> Vec<&str> {
        args.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_build_command_minimal_request() {
        let request = HostRequest::new("Test", "doom2.wad", GameMode::Deathmatch);
        let args = build_command(&request, &launch(), 10666);
        assert_eq!(
            strs(&args),
            vec![
                "/opt/zandronum/zandronum-server",
                "-host",
                "-port",
                "10666",
                "+sv_hostname",
                "[DH] Test",
                "-iwad",
                "/srv/iwads/doom2.wad",
                "deathmatch",
                "true",
                "-skill",
                "4",
                "+sv_maxclients",
                "32",
                "+sv_maxplayers",
                "32",
                "+sv_suddendeath",
                "false",
            ]
        );
    }

    #[test]
    fn test_build_command_files_in_order_with_bundled_data() {
        let mut request = HostRequest::new("Test", "doom2.wad", GameMode::Ctf);
        request.extraiwads = vec!["tnt.wad".into()];
        request.wads = vec!["zdctf.wad".into(), "music.pk3".into()];
        request.data = true;

        let args = build_command(&request, &launch(), 10666);
        let files: Vec<&str> = args
            .windows(2)
            .filter(|w| w[0] == "-file")
            .map(|w| w[1].as_str())
            .collect();
        assert_eq!(
            files,
            vec![
                "/srv/iwads/tnt.wad",
                "/srv/wads/skulltag_actors.pk3",
                "/srv/wads/skulltag_data.pk3",
                "/srv/wads/zdctf.wad",
                "/srv/wads/music.pk3",
            ]
        );
    }

    #[test]
    fn test_build_command_flags_only_when_positive() {
        let mut request = HostRequest::new("Test", "doom2.wad", GameMode::Deathmatch);
        request.dmflags = 0;
        request.dmflags2 = 256;
        request.fraglimit = -1;
        request.timelimit = 15;
        request.maxlives = 0;

        let args = build_command(&request, &launch(), 10666);
        let joined = args.join(" ");
        assert!(!joined.contains("+dmflags "));
        assert!(joined.contains("+dmflags2 256"));
        assert!(!joined.contains("+fraglimit"));
        assert!(joined.contains("+timelimit 15"));
        assert!(!joined.contains("+sv_maxlives"));
    }

    #[test]
    fn test_build_command_passwords_and_options() {
        let mut request = HostRequest::new("Test", "doom2.wad", GameMode::Cooperative);
        request.config = Some("coop.cfg".into());
        request.instagib = true;
        request.buckshot = true;
        request.suddendeath = true;
        request.maxlives = 2;
        request.password = Some("knock".into());
        request.joinpassword = Some("enter".into());

        let args = build_command(&request, &launch(), 10667);
        let tail = args.join(" ");
        assert!(tail.contains("cooperative true -skill 3 +exec /srv/cfgs/coop.cfg"));
        assert!(tail.contains("+instagib true +buckshot true"));
        assert!(tail.contains("+sv_maxplayers 32 +sv_maxlives 2 +sv_suddendeath true"));
        assert!(tail.ends_with(
            "+sv_forcepassword true +sv_password knock +sv_forcejoinpassword true +sv_joinpassword enter"
        ));
    }

    #[test]
    fn test_build_command_flag_order() {
        let mut request = HostRequest::new("Test", "doom2.wad", GameMode::Deathmatch);
        request.dmflags = 1;
        request.dmflags2 = 2;
        request.zadmflags = 3;
        request.compatflags = 4;
        request.zacompatflags = 5;
        request.dmflags3 = 6;
        request.compatflags2 = 7;

        let args = build_command(&request, &launch(), 10666);
        let joined = args.join(" ");
        assert!(joined.contains("+dmflags 1 +dmflags2 2 +zadmflags 3 +compatflags 4 +zacompatflags 5 +sv_maxclients"));
        assert!(!joined.contains("+dmflags3"));
        assert!(!joined.contains("+compatflags2"));
    }
}
