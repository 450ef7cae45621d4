//! 入站指令回调

use rover_protocol::CommandMessage;

/// 入站指令回调
///
/// 在监督线程上调用，负载已解码为 [`CommandMessage`]。
///
/// # 性能要求
///
/// - 必须立即返回，禁止阻塞（拍照等耗时操作交给独立工作线程）
/// - 推荐使用 `crossbeam_channel::Sender::try_send` 转交给控制循环
///
/// # 示例
///
/// ```rust
/// use crossbeam_channel::{Sender, bounded};
/// use rover_link::CommandCallback;
/// use rover_protocol::CommandMessage;
///
/// struct Forward {
///     sender: Sender<CommandMessage>,
/// }
///
/// impl CommandCallback for Forward {
///     fn on_command(&self, _topic: &str, command: CommandMessage) {
///         let _ = self.sender.try_send(command);
///     }
/// }
///
/// let (tx, rx) = bounded(8);
/// let callback = Forward { sender: tx };
/// callback.on_command("rover/commands", CommandMessage::Stop);
/// assert_eq!(rx.try_recv().unwrap(), CommandMessage::Stop);
/// ```
pub trait CommandCallback: Send + Sync {
    fn on_command(&self, topic: &str, command: CommandMessage);
}

impl<F> CommandCallback for F
where
    F: Fn(&str, CommandMessage) + Send + Sync,
{
    fn on_command(&self, topic: &str, command: CommandMessage) {
        self(topic, command)
    }
}
