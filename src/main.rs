use site_migrate::migrator::Migrator;
use site_migrate::models::MigrationConfig;

/// 对内置站点列表执行一次迁移。
///
/// 没有命令行参数；任何错误都会以非零退出码结束进程。
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = MigrationConfig::builtin()?;
    let mut migrator = Migrator::open(config)?;
    migrator.run()?;

    Ok(())
}
