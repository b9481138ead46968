//! Screens, actions, and the transition table.
//!
//! The current screen is not persisted; it is implicit in which keyboard was
//! last shown. What IS explicit is the finite set of screen/action tags and
//! the table mapping button presses to navigation, so routing never matches
//! raw label strings outside this module.

use crate::messaging::types::ReplyKeyboard;

pub mod labels {
    pub const LOGIN: &str = "Login";
    pub const LOGOUT: &str = "Logout";
    pub const MERCH: &str = "Мерч 🛒";

    pub const VIDEO_COURSES: &str = "Видео Курсы 🎉";
    pub const GUIDES: &str = "Гайды 🥋";
    pub const REVIEWS: &str = "Отзывы 💬";
    pub const HELP: &str = "Помощь 🚨";
    pub const HOW_TO: &str = "Как работать с ботом ❓";

    pub const MANAGE_LESSONS: &str = "Управление уроками 📚";
    pub const MANAGE_MERCH: &str = "Управление мерчем 🛒";
    pub const MANAGE_PASSWORDS: &str = "Управление паролями 🛠";
    pub const BACK: &str = "Назад";

    pub const ADD_LESSON: &str = "Добавить урок";
    pub const DELETE_LESSON: &str = "Удалить урок";
    pub const LIST_LESSONS: &str = "Просмотреть уроки";

    pub const ADD_MERCH: &str = "Добавить мерч";
    pub const DELETE_MERCH: &str = "Удалить мерч";
    pub const LIST_MERCH: &str = "Просмотреть мерч";

    pub const SHOW_PASSWORDS: &str = "Показать все пароли";
    pub const ADD_PASSWORD: &str = "Добавить пароль";
    pub const DELETE_PASSWORD: &str = "Удалить пароль";
    pub const SET_RESOURCE_PASSWORD: &str = "Задать пароль ресурса";
    pub const DELETE_RESOURCE_PASSWORD: &str = "Удалить пароль ресурса";
}

pub mod texts {
    pub const WELCOME: &str =
        "Добро пожаловать! Пожалуйста, нажмите кнопку Login для входа.";
    pub const ALREADY_LOGGED_IN: &str = "Вы уже вошли в систему! Выберите раздел.";
    pub const ADMIN_LOGGED_IN: &str = "Вы вошли как администратор! Выберите раздел.";
    pub const CHOOSE_SECTION: &str = "Выберите раздел.";
    pub const CHOOSE_ACTION: &str = "Выберите действие:";
    pub const LOGIN_PROMPT: &str = "Пожалуйста, введите ваш пароль.";
    pub const PASSWORD_OK: &str = "Пароль верный! Выберите раздел.";
    pub const PASSWORD_WRONG: &str = "Пароль неверный, попробуйте снова.";
    pub const LOGGED_OUT: &str = "Вы успешно вышли из системы.";

    pub const SEND_LESSON_PHOTO: &str = "Пожалуйста, отправьте картинку для превью урока.";
    pub const LESSON_FORM: &str = "Теперь введите данные урока в формате:\n1) Плейлист\n2) Номер урока\n3) URL видео\n4) Описание\n5) Есть подуроки (да/нет)";
    pub const LESSON_ADDED: &str = "Урок добавлен.";
    pub const LESSON_DELETE_PROMPT: &str = "Введите номер урока для удаления:";
    pub const LESSON_DELETED: &str = "Урок удален.";
    pub const LESSON_NOT_FOUND: &str = "Урок с таким номером не найден.";
    pub const LESSON_BAD_NUMBER: &str = "Неверный номер урока. Попробуйте снова.";
    pub const LESSONS_EMPTY: &str = "Уроков пока нет.";
    pub const NO_LESSON_ACCESS: &str =
        "У вас пока нет открытых уроков. Отправьте пароль урока в формате: lesson7 пароль.";

    pub const SEND_MERCH_PHOTOS: &str =
        "Пожалуйста, отправьте картинки для мерча (до 3 картинок).";
    pub const MERCH_FORM: &str =
        "Теперь введите данные мерча в формате:\n1) Название\n2) Цена\n3) Описание";
    pub const MERCH_ADDED: &str = "Мерч добавлен.";
    pub const MERCH_DELETE_PROMPT: &str = "Введите название мерча для удаления:";
    pub const MERCH_DELETED: &str = "Мерч удален.";
    pub const MERCH_NOT_FOUND: &str = "Мерч с таким названием не найден.";
    pub const MERCH_BAD_NAME: &str = "Неверное название мерча. Попробуйте снова.";
    pub const MERCH_EMPTY: &str = "Мерча пока нет.";
    pub const ORDER_HINT: &str = "Чтобы заказать, выберите товар:";
    pub const ORDER_CONFIRMED: &str = "Заказ принят! Мы свяжемся с вами для оформления.";

    pub const PASSWORD_LIST_HEADER: &str = "Пароли пользователей:";
    pub const PASSWORD_LIST_EMPTY: &str = "Паролей пока нет.";
    pub const PASSWORD_ADD_PROMPT: &str = "Введите новый пароль:";
    pub const PASSWORD_ADDED: &str = "Пароль добавлен.";
    pub const PASSWORD_DELETE_PROMPT: &str = "Введите пароль для удаления:";
    pub const PASSWORD_DELETED: &str = "Пароль удален.";
    pub const PASSWORD_NOT_FOUND: &str = "Такой пароль не найден.";

    pub const RESOURCE_PASSWORD_SET_PROMPT: &str =
        "Введите ресурс и пароль в формате: guide1 пароль (или lesson7 пароль).";
    pub const RESOURCE_PASSWORD_SET: &str = "Пароль ресурса сохранён.";
    pub const RESOURCE_PASSWORD_DELETE_PROMPT: &str =
        "Введите ресурс в формате: guide1 (или lesson7).";
    pub const RESOURCE_PASSWORD_DELETED: &str = "Пароль ресурса удалён.";
    pub const RESOURCE_PASSWORD_NOT_FOUND: &str = "Для этого ресурса пароль не задан.";
    pub const BAD_RESOURCE: &str = "Не удалось распознать ресурс. Пример: guide1 или lesson7.";

    pub const NO_GUIDE_ACCESS: &str =
        "У вас пока нет открытых гайдов. Отправьте пароль гайда в формате: guide1 пароль.";

    pub const BAD_FORM: &str =
        "Неверный формат данных. Начните действие заново через меню.";
    pub const FLOW_IN_PROGRESS: &str = "Сначала завершите текущее действие.";
    pub const UNRECOGNIZED: &str =
        "Не понимаю это сообщение. Используйте кнопки меню или /start.";
    pub const GENERIC_ERROR: &str = "Произошла ошибка. Попробуйте ещё раз.";
    pub const NO_ACCESS: &str = "Нет доступа.";

    pub const REVIEWS_TEXT: &str =
        "Отзывы наших учеников: https://t.me/+reviews\nБудем рады и вашему!";
    pub const HELP_TEXT: &str =
        "Если что-то не работает, напишите нам: @support. Постараемся помочь быстро.";
    pub const HOW_TO_TEXT: &str = "Как работать с ботом:\n\
        1) Войдите через Login и пароль.\n\
        2) Пароль урока открывает урок: lesson7 пароль.\n\
        3) Пароль гайда открывает PDF: guide1 пароль.\n\
        4) Разделы меню показывают только открытые материалы.";

    pub fn guide_unlocked(guide: &crate::domain::GuideId) -> String {
        format!("Гайд {guide} открыт! Выберите раздел.")
    }

    pub fn lesson_unlocked(lesson: crate::domain::LessonNumber) -> String {
        format!("Урок {lesson} открыт! Выберите раздел.")
    }

    pub fn guide_unavailable(guide: &crate::domain::GuideId) -> String {
        format!("Гайд {guide} временно недоступен.")
    }
}

/// Everything a button press can mean.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Login,
    Logout,
    ShowMerch,

    VideoCourses,
    Guides,
    Reviews,
    Help,
    HowTo,

    ManageLessons,
    ManageMerch,
    ManagePasswords,
    Back,

    AddLesson,
    DeleteLesson,
    ListLessons,

    AddMerch,
    DeleteMerch,
    ListMerch,

    ShowPasswords,
    AddPassword,
    DeletePassword,
    SetResourcePassword,
    DeleteResourcePassword,
}

impl Action {
    pub fn from_label(text: &str) -> Option<Self> {
        use labels::*;
        Some(match text {
            LOGIN => Action::Login,
            LOGOUT => Action::Logout,
            MERCH => Action::ShowMerch,
            VIDEO_COURSES => Action::VideoCourses,
            GUIDES => Action::Guides,
            REVIEWS => Action::Reviews,
            HELP => Action::Help,
            HOW_TO => Action::HowTo,
            MANAGE_LESSONS => Action::ManageLessons,
            MANAGE_MERCH => Action::ManageMerch,
            MANAGE_PASSWORDS => Action::ManagePasswords,
            BACK => Action::Back,
            ADD_LESSON => Action::AddLesson,
            DELETE_LESSON => Action::DeleteLesson,
            LIST_LESSONS => Action::ListLessons,
            ADD_MERCH => Action::AddMerch,
            DELETE_MERCH => Action::DeleteMerch,
            LIST_MERCH => Action::ListMerch,
            SHOW_PASSWORDS => Action::ShowPasswords,
            ADD_PASSWORD => Action::AddPassword,
            DELETE_PASSWORD => Action::DeletePassword,
            SET_RESOURCE_PASSWORD => Action::SetResourcePassword,
            DELETE_RESOURCE_PASSWORD => Action::DeleteResourcePassword,
            _ => return None,
        })
    }

    /// Actions reachable only from the admin screens.
    pub fn requires_admin(self) -> bool {
        !matches!(
            self,
            Action::Login
                | Action::Logout
                | Action::ShowMerch
                | Action::VideoCourses
                | Action::Guides
                | Action::Reviews
                | Action::Help
                | Action::HowTo
        )
    }
}

/// UI states, each with a reply keyboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Screen {
    Login,
    Root,
    Admin,
    LessonAdmin,
    MerchAdmin,
    PasswordAdmin,
}

impl Screen {
    /// The home screen for a session's role.
    pub fn home(is_admin: bool) -> Self {
        if is_admin {
            Screen::Admin
        } else {
            Screen::Root
        }
    }

    pub fn keyboard(self) -> ReplyKeyboard {
        use labels::*;
        match self {
            Screen::Login => ReplyKeyboard::single_row(&[LOGIN, MERCH]),
            Screen::Root => ReplyKeyboard::single_column(&[
                VIDEO_COURSES,
                GUIDES,
                REVIEWS,
                HELP,
                HOW_TO,
                MERCH,
                LOGOUT,
            ]),
            Screen::Admin => ReplyKeyboard::single_column(&[
                MANAGE_LESSONS,
                MANAGE_MERCH,
                MANAGE_PASSWORDS,
                LOGOUT,
            ]),
            Screen::LessonAdmin => {
                ReplyKeyboard::single_column(&[ADD_LESSON, DELETE_LESSON, LIST_LESSONS, BACK])
            }
            Screen::MerchAdmin => {
                ReplyKeyboard::single_column(&[ADD_MERCH, DELETE_MERCH, LIST_MERCH, BACK])
            }
            Screen::PasswordAdmin => ReplyKeyboard::single_column(&[
                SHOW_PASSWORDS,
                ADD_PASSWORD,
                DELETE_PASSWORD,
                SET_RESOURCE_PASSWORD,
                DELETE_RESOURCE_PASSWORD,
                BACK,
            ]),
        }
    }
}

/// Navigation table: which screen a navigation action leads to. Returns None
/// for actions that are not navigation (they have side effects instead).
pub fn transition(action: Action) -> Option<Screen> {
    Some(match action {
        Action::ManageLessons => Screen::LessonAdmin,
        Action::ManageMerch => Screen::MerchAdmin,
        Action::ManagePasswords => Screen::PasswordAdmin,
        Action::Back => Screen::Admin,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_keyboard_label_maps_to_an_action() {
        for screen in [
            Screen::Login,
            Screen::Root,
            Screen::Admin,
            Screen::LessonAdmin,
            Screen::MerchAdmin,
            Screen::PasswordAdmin,
        ] {
            for row in screen.keyboard().rows {
                for label in row {
                    assert!(
                        Action::from_label(&label).is_some(),
                        "label {label:?} on {screen:?} has no action"
                    );
                }
            }
        }
    }

    #[test]
    fn admin_submenus_navigate_back_to_admin() {
        assert_eq!(transition(Action::Back), Some(Screen::Admin));
        assert_eq!(transition(Action::ManageLessons), Some(Screen::LessonAdmin));
        assert_eq!(transition(Action::ManageMerch), Some(Screen::MerchAdmin));
        assert_eq!(
            transition(Action::ManagePasswords),
            Some(Screen::PasswordAdmin)
        );
        assert_eq!(transition(Action::Logout), None);
        assert_eq!(transition(Action::AddLesson), None);
    }

    #[test]
    fn role_gating_covers_admin_actions() {
        assert!(Action::AddLesson.requires_admin());
        assert!(Action::ShowPasswords.requires_admin());
        assert!(!Action::VideoCourses.requires_admin());
        assert!(!Action::ShowMerch.requires_admin());
        assert!(!Action::Logout.requires_admin());
    }

    #[test]
    fn unknown_label_has_no_action() {
        assert_eq!(Action::from_label("что-то ещё"), None);
    }
}
