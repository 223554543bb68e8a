//! 诊断提交状态机
//!
//! 管理"新建诊断"弹窗的完整生命周期状态转换

use cxr_core::{CxrError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 提交状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum SubmissionState {
    /// 弹窗关闭
    #[default]
    Idle,
    /// 弹窗打开，患者或图片未选
    Composing,
    /// 患者与图片均已选择
    Ready,
    /// 预测请求进行中
    Submitting,
    ResultReady,
    Failed,
}

/// 状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SubmissionEvent {
    Open,
    DraftComplete,
    DraftIncomplete,
    Submit,
    Succeed,
    Fail,
    /// 显式的关闭按钮
    Close,
    /// 点击遮罩层关闭
    Dismiss,
}

/// 提交状态机
#[derive(Debug)]
pub struct SubmissionStateMachine {
    transitions: HashMap<(SubmissionState, SubmissionEvent), SubmissionState>,
}

impl SubmissionStateMachine {
    pub fn new() -> Self {
        use SubmissionEvent as E;
        use SubmissionState as S;

        let mut transitions = HashMap::new();

        transitions.insert((S::Idle, E::Open), S::Composing);
        transitions.insert((S::ResultReady, E::Open), S::Composing);

        // 草稿变化
        for from in [S::Composing, S::Ready, S::Failed] {
            transitions.insert((from, E::DraftComplete), S::Ready);
            transitions.insert((from, E::DraftIncomplete), S::Composing);
        }

        transitions.insert((S::Ready, E::Submit), S::Submitting);
        transitions.insert((S::Failed, E::Submit), S::Submitting);
        transitions.insert((S::Submitting, E::Succeed), S::ResultReady);
        transitions.insert((S::Submitting, E::Fail), S::Failed);

        // 提交中只能通过遮罩层关闭
        for from in [S::Composing, S::Ready, S::ResultReady, S::Failed] {
            transitions.insert((from, E::Close), S::Idle);
        }
        for from in [S::Composing, S::Ready, S::Submitting, S::ResultReady, S::Failed] {
            transitions.insert((from, E::Dismiss), S::Idle);
        }

        Self { transitions }
    }

    pub fn can_transition(&self, from: SubmissionState, event: SubmissionEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: SubmissionState, event: SubmissionEvent) -> Result<SubmissionState> {
        self.transitions
            .get(&(from, event))
            .copied()
            .ok_or_else(|| CxrError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            })
    }

    /// 获取状态的所有可能事件
    pub fn possible_events(&self, current: SubmissionState) -> Vec<SubmissionEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for SubmissionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SubmissionEvent as E;
    use SubmissionState as S;

    #[test]
    fn test_happy_path() {
        let sm = SubmissionStateMachine::new();

        let state = sm.transition(S::Idle, E::Open).unwrap();
        let state = sm.transition(state, E::DraftComplete).unwrap();
        let state = sm.transition(state, E::Submit).unwrap();
        assert_eq!(state, S::Submitting);
        assert_eq!(sm.transition(state, E::Succeed).unwrap(), S::ResultReady);
    }

    #[test]
    fn test_cannot_submit_incomplete_draft() {
        let sm = SubmissionStateMachine::new();
        assert!(!sm.can_transition(S::Composing, E::Submit));
        assert!(!sm.can_transition(S::Idle, E::Submit));
    }

    #[test]
    fn test_close_blocked_while_submitting_but_dismiss_allowed() {
        let sm = SubmissionStateMachine::new();

        let result = sm.transition(S::Submitting, E::Close);
        assert!(matches!(result, Err(CxrError::InvalidStateTransition { .. })));
        assert_eq!(sm.transition(S::Submitting, E::Dismiss).unwrap(), S::Idle);
    }

    #[test]
    fn test_retry_after_failure() {
        let sm = SubmissionStateMachine::new();
        assert_eq!(sm.transition(S::Failed, E::Submit).unwrap(), S::Submitting);
        assert_eq!(sm.transition(S::Failed, E::DraftIncomplete).unwrap(), S::Composing);
    }

    #[test]
    fn test_possible_events_while_submitting() {
        let sm = SubmissionStateMachine::new();
        let mut events = sm.possible_events(S::Submitting);
        events.sort_by_key(|e| format!("{:?}", e));
        assert_eq!(events, vec![E::Dismiss, E::Fail, E::Succeed]);
    }
}
